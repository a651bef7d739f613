// UI module - adapters between a front end and the conversion service
//
// This module contains:
// - ConversionPrompt: The conversion dialogue seam, answered with a DialogueOutcome
// - AutoPrompt: A headless prompt that answers from the user configuration
// - QueueView: The queue window's model of held and deleted entries

pub mod prompt;
pub mod queue_view;

pub use prompt::{AutoPrompt, ConversionPrompt, DialogueOutcome, apply_outcome};
pub use queue_view::{QueueIntent, QueueRow, QueueView};
