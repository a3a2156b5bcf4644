// Prediction engine: participant submissions, scoring, and field-wide stats.

pub mod aggregate;
pub mod score;
pub mod submission;
