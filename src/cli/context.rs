use crate::config::Config;

use super::output::OutputFormat;

pub struct CliContext {
    config: Config,
    output: OutputFormat,
}

impl CliContext {
    pub fn new(config: Config, output: OutputFormat) -> Self {
        Self { config, output }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn output(&self) -> OutputFormat {
        self.output
    }
}
