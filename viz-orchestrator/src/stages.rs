//! The visualized inference pipeline, in reveal order

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    InputText,
    Tokenizer,
    Embedding,
    TransformerLayers,
    Pooling,
    ClassificationHead,
    Output,
}

impl Stage {
    /// Every stage, in the order a reveal pass walks them
    pub const ALL: [Stage; 7] = [
        Stage::InputText,
        Stage::Tokenizer,
        Stage::Embedding,
        Stage::TransformerLayers,
        Stage::Pooling,
        Stage::ClassificationHead,
        Stage::Output,
    ];

    pub fn count() -> usize {
        Self::ALL.len()
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Stage> {
        Self::ALL.get(index).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            Stage::InputText => "Input Text",
            Stage::Tokenizer => "Tokenizer",
            Stage::Embedding => "Embedding Layer",
            Stage::TransformerLayers => "Transformer Layers",
            Stage::Pooling => "Pooling",
            Stage::ClassificationHead => "Classification Head",
            Stage::Output => "Output",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Stage::InputText => "Raw text submitted by the user",
            Stage::Tokenizer => "Word segmentation and BPE",
            Stage::Embedding => "Tokens mapped to 768-dim vectors",
            Stage::TransformerLayers => "12 layers of multi-head attention",
            Stage::Pooling => "[CLS] token representation",
            Stage::ClassificationHead => "Linear layer → softmax",
            Stage::Output => "Positive / Negative / Neutral + confidence",
        }
    }

    pub fn info(self) -> StageInfo {
        StageInfo {
            index: self.index(),
            id: self,
            name: self.name(),
            description: self.description(),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Serializable stage description for render surfaces
#[derive(Debug, Clone, Serialize)]
pub struct StageInfo {
    pub index: usize,
    pub id: Stage,
    pub name: &'static str,
    pub description: &'static str,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indices_follow_order() {
        for (i, stage) in Stage::ALL.iter().enumerate() {
            assert_eq!(stage.index(), i);
            assert_eq!(Stage::from_index(i), Some(*stage));
        }
        assert_eq!(Stage::from_index(Stage::count()), None);
    }

    #[test]
    fn test_first_and_last() {
        assert_eq!(Stage::ALL[0].name(), "Input Text");
        assert_eq!(Stage::ALL[Stage::count() - 1], Stage::Output);
    }
}
