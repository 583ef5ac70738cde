//! Render instructions produced by the reconciler
//!
//! UI-agnostic: a display adapter translates these into actual screen updates.

use serde::{Deserialize, Serialize};

use crate::model::{Comment, CustomerStatus, OrderInfo};

/// A comment projected for display with its enrichment attached
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayComment {
    #[serde(flatten)]
    pub comment: Comment,
    /// Order linked by comment id, falling back to author id
    pub order: Option<OrderInfo>,
    /// Normalized phones found in the comment text and the linked order
    pub phones: Vec<String>,
    /// First resolved customer record among `phones`
    pub customer: Option<CustomerStatus>,
    /// Customer label; "Normal" until a lookup succeeds
    pub status_label: String,
    /// Inside the "new" highlight window
    pub is_new: bool,
}

/// Piece of a highlighted field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextSegment {
    pub text: String,
    pub highlighted: bool,
}

impl TextSegment {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            highlighted: false,
        }
    }

    pub fn highlighted(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            highlighted: true,
        }
    }
}

/// A search hit with highlighted name and message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilteredComment {
    #[serde(flatten)]
    pub display: DisplayComment,
    pub name_segments: Vec<TextSegment>,
    pub text_segments: Vec<TextSegment>,
}

/// One display update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum RenderInstruction {
    /// Replace the whole list (first load, search cleared, page change)
    ReplaceAll { items: Vec<DisplayComment> },

    /// Insert at the top; `items` is already in top-to-bottom order
    PrependNew { items: Vec<DisplayComment> },

    /// Replace the list with search results
    FilteredReplace {
        items: Vec<FilteredComment>,
        matched: usize,
        total: usize,
    },

    /// Redraw these comments in place (enrichment changed)
    UpdateItems { items: Vec<DisplayComment> },

    /// The "new" highlight window for these comments has elapsed
    ClearNewFlags { ids: Vec<String> },

    /// Scroll the list back to the top
    ResetScroll,
}

impl RenderInstruction {
    /// Short name for logging
    pub fn kind(&self) -> &'static str {
        match self {
            RenderInstruction::ReplaceAll { .. } => "ReplaceAll",
            RenderInstruction::PrependNew { .. } => "PrependNew",
            RenderInstruction::FilteredReplace { .. } => "FilteredReplace",
            RenderInstruction::UpdateItems { .. } => "UpdateItems",
            RenderInstruction::ClearNewFlags { .. } => "ClearNewFlags",
            RenderInstruction::ResetScroll => "ResetScroll",
        }
    }
}
