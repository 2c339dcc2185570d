//! Track configuration

/// Per-track configuration
///
/// Feature flags and ring sizing are passed to every track explicitly.
#[derive(Debug, Clone)]
pub struct TrackConfig {
    /// Materialize the AVCC encoding of every finalized frame
    pub enable_avcc: bool,

    /// Materialize the FLV tag encoding of every finalized frame (implies AVCC)
    pub enable_flv: bool,

    /// Initial number of ring slots
    pub ring_size: usize,

    /// The ring only grows to protect its last keyframe while below this size
    pub max_ring_size: usize,

    /// Slots added per growth step
    pub grow_step: usize,

    /// Default NALU length-prefix width for AVCC input, until a sequence header says otherwise
    pub nalu_length_size: usize,
}

impl Default for TrackConfig {
    fn default() -> Self {
        Self {
            enable_avcc: false,
            enable_flv: false,
            ring_size: 64,
            max_ring_size: 256,
            grow_step: 5,
            nalu_length_size: 4,
        }
    }
}

impl TrackConfig {
    /// Enable AVCC completion
    pub fn enable_avcc(mut self) -> Self {
        self.enable_avcc = true;
        self
    }

    /// Enable FLV tag completion
    pub fn enable_flv(mut self) -> Self {
        self.enable_flv = true;
        self
    }

    /// Set the initial ring size (at least one slot)
    pub fn ring_size(mut self, size: usize) -> Self {
        self.ring_size = size.max(1);
        self
    }

    /// Set the growth ceiling
    pub fn max_ring_size(mut self, size: usize) -> Self {
        self.max_ring_size = size;
        self
    }

    /// Set the growth step (at least one slot)
    pub fn grow_step(mut self, step: usize) -> Self {
        self.grow_step = step.max(1);
        self
    }

    /// Set the NALU length-prefix width, clamped to 1..=4 bytes
    pub fn nalu_length_size(mut self, size: usize) -> Self {
        self.nalu_length_size = size.clamp(1, 4);
        self
    }

    /// Whether flush builds the AVCC form
    pub(crate) fn wants_avcc(&self) -> bool {
        self.enable_avcc || self.enable_flv
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TrackConfig::default();

        assert!(!config.enable_avcc);
        assert!(!config.enable_flv);
        assert!(!config.wants_avcc());
        assert_eq!(config.ring_size, 64);
        assert_eq!(config.max_ring_size, 256);
        assert_eq!(config.grow_step, 5);
        assert_eq!(config.nalu_length_size, 4);
    }

    #[test]
    fn test_flv_implies_avcc() {
        let config = TrackConfig::default().enable_flv();
        assert!(config.wants_avcc());
        assert!(!config.enable_avcc);
    }

    #[test]
    fn test_builder_clamps() {
        let config = TrackConfig::default()
            .ring_size(0)
            .grow_step(0)
            .nalu_length_size(8);

        assert_eq!(config.ring_size, 1);
        assert_eq!(config.grow_step, 1);
        assert_eq!(config.nalu_length_size, 4);
    }

    #[test]
    fn test_builder_chaining() {
        let config = TrackConfig::default()
            .enable_avcc()
            .ring_size(16)
            .max_ring_size(32)
            .nalu_length_size(2);

        assert!(config.enable_avcc);
        assert_eq!(config.ring_size, 16);
        assert_eq!(config.max_ring_size, 32);
        assert_eq!(config.nalu_length_size, 2);
    }
}
