use crate::cli::OutputFormat;

mod human;
mod json;

/// What is about to run, printed before the first virtual user starts.
pub(crate) struct RunHeader<'a> {
    pub profile: &'a surge_core::LoadProfile,
    pub target: &'a surge_core::ResolvedTarget,
}

pub(crate) trait OutputFormatter: Send + Sync {
    fn print_header(&self, header: &RunHeader<'_>);
    fn progress(&self, header: &RunHeader<'_>) -> Option<surge_core::ProgressFn>;
    fn print_summary(&self, report: &surge_core::Report) -> anyhow::Result<()>;
    fn print_profiles(&self, profiles: &[surge_core::LoadProfile]) -> anyhow::Result<()>;
}

pub(crate) fn formatter(format: OutputFormat) -> Box<dyn OutputFormatter> {
    match format {
        OutputFormat::HumanReadable => Box::new(human::HumanReadableOutput::new()),
        OutputFormat::Json => Box::new(json::JsonOutput),
    }
}
