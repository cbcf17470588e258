use clap::ValueEnum;

/// What a run does with the loaded models.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RunMode {
    /// Skip the detector and estimate one pose per image on a full-image box.
    #[default]
    FullFrame,
    /// Detect people first and estimate a pose inside each accepted box.
    Detect,
    /// Run the pose model once on a dummy input and write an I/O trace instead of processing images.
    ExportTrace,
}

impl RunMode {
    pub fn str(&self) -> &'static str {
        match self {
            RunMode::FullFrame => "full-frame",
            RunMode::Detect => "detect",
            RunMode::ExportTrace => "export-trace",
        }
    }
}
