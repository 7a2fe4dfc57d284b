use super::Parser;

#[derive(Parser, Debug)]
#[command(name = "marquee", about = "Session and membership API server")]
pub struct Cli {
    /// Path to a settings file; defaults to the build profile's file.
    #[arg(long)]
    pub settings: Option<String>,
}
