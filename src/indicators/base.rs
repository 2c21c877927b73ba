/// Behaviour shared by indicators that trail a stream of samples.
pub trait TrailingIndicator {
    /// Indicator value over the samples currently held.
    fn calculate_indicator(&self) -> f64;

    /// Feeds a new sample into the trailing buffer.
    fn add_sample(&mut self, value: f64);

    /// Number of samples currently held.
    fn sample_count(&self) -> usize;
}
