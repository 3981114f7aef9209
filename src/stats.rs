//! Per-frame rendering statistics

use std::fmt;

/// Counters and pass trace of one rendered frame
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameStats {
    /// Every mesh or full-screen draw issued
    pub draw_calls: usize,
    /// Render calls produced by collection
    pub render_calls: usize,
    /// Nodes rejected by the frustum test
    pub culled_nodes: usize,
    /// Nodes skipped for degenerate geometry
    pub skipped_calls: usize,
    /// Shadow maps rendered this frame
    pub shadow_maps: usize,
    /// Lights left out of single-pass draws because of the cap
    pub dropped_lights: usize,
    /// Passes in execution order
    pub passes: Vec<&'static str>,
}

impl FrameStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin_pass(&mut self, name: &'static str) {
        log::trace!("pass: {}", name);
        self.passes.push(name);
    }

    pub fn ran(&self, name: &str) -> bool {
        self.passes.iter().any(|pass| *pass == name)
    }

    /// Index of the first run of `name` in the trace
    pub fn position(&self, name: &str) -> Option<usize> {
        self.passes.iter().position(|pass| *pass == name)
    }
}

impl fmt::Display for FrameStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} draws, {} calls ({} culled, {} skipped), {} shadow maps, {} dropped lights; \
             passes: {}",
            self.draw_calls,
            self.render_calls,
            self.culled_nodes,
            self.skipped_calls,
            self.shadow_maps,
            self.dropped_lights,
            self.passes.join(" > ")
        )
    }
}
