use std::fmt;

use vds_slots::Source;

/// Which hardware path renders the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CompositionMode {
    /// Only between a commit and the next prepare.
    #[default]
    Unknown,
    /// GPU composes straight into the sink buffer.
    Gles,
    /// Compositor writes the sink buffer; the GPU is not involved.
    Hwc,
    /// GPU composes into a scratch buffer that the compositor then composites into the sink.
    Mixed,
}

impl CompositionMode {
    pub fn name(self) -> &'static str {
        match self {
            CompositionMode::Unknown => "UNKNOWN",
            CompositionMode::Gles => "GLES",
            CompositionMode::Hwc => "HWC",
            CompositionMode::Mixed => "MIXED",
        }
    }

    /// Whether the GPU renders anything this frame.
    pub fn uses_gles(self) -> bool {
        matches!(self, CompositionMode::Gles | CompositionMode::Mixed)
    }
}

impl fmt::Display for CompositionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The pool the GPU client's framebuffer comes from under `mode`.
pub fn fb_source_for(mode: CompositionMode) -> Source {
    match mode {
        CompositionMode::Mixed => Source::Scratch,
        _ => Source::Sink,
    }
}
