use clap::{Args as ClapArgs, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "mixcast")]
#[command(about = "Live restream with a mixable secondary audio source", long_about = None)]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<CliCommand>,
}

#[derive(Subcommand, Debug)]
pub enum CliCommand {
    /// Print version information
    Version,
    /// Verify that the external tools (ffmpeg, recorder, browser driver) are available
    Check,
    /// Print the engine invocation a set of mix parameters would produce
    Graph(GraphCliArgs),
}

#[derive(ClapArgs, Debug)]
pub struct GraphCliArgs {
    /// Primary live feed to read
    #[arg(long)]
    pub input_url: String,
    /// Destination endpoint to publish to
    #[arg(long)]
    pub output_url: String,
    /// Secondary audio locator (URL or file path); omit for primary-only
    #[arg(long)]
    pub secondary: Option<String>,
    /// Loop the secondary input indefinitely (finite local resources)
    #[arg(long)]
    pub looped: bool,
    /// Primary audio gain in percent (0-200)
    #[arg(long, default_value = "100")]
    pub primary_volume: u32,
    /// Secondary audio gain in percent (0-200)
    #[arg(long, default_value = "100")]
    pub secondary_volume: u32,
    /// Primary audio/video delay in milliseconds (0-5000)
    #[arg(long, default_value = "0")]
    pub primary_delay_ms: u32,
    /// Secondary audio delay in milliseconds (0-5000)
    #[arg(long, default_value = "0")]
    pub secondary_delay_ms: u32,
    /// Video bitrate in kbps, used when re-encoding is required
    #[arg(long, default_value = "4500")]
    pub video_bitrate_kbps: u32,
}
