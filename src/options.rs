use clap::Parser;

/// EG4 telemetry normalizer - turns captured inverter, battery and grid
/// controller readings into validated canonical sensor maps
#[derive(Clone, Debug, Parser)]
#[clap(author, version)]
pub struct Options {
    /// Config file to read
    #[clap(short = 'c', long = "config", default_value = "config.yaml")]
    pub config_file: String,

    /// Optional runtime limit in seconds
    #[clap(short = 't', long = "time")]
    pub runtime: Option<u64>,

    /// Poll every group once and exit
    #[clap(long = "once")]
    pub once: bool,
}

impl Options {
    pub fn new() -> Self {
        Self::parse()
    }
}

impl Default for Options {
    fn default() -> Self {
        Self {
            config_file: "config.yaml".to_string(),
            runtime: None,
            once: false,
        }
    }
}
