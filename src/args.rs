use clap::Parser;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Camera Index (default 0)
    #[arg(short, long, default_value_t = 0)]
    pub cam_index: u32,

    /// List available cameras
    #[arg(long)]
    pub list: bool,

    /// Configuration file
    #[arg(long, default_value = "config.json")]
    pub config: String,

    /// Name recorded in the emotion history
    #[arg(short, long, default_value = "anonymous")]
    pub username: String,

    /// Preferred song language (remembered for this user)
    #[arg(short, long)]
    pub language: Option<String>,

    /// Preferred artist (remembered for this user)
    #[arg(short, long)]
    pub artist: Option<String>,

    /// Clear the current emotion and exit
    #[arg(long)]
    pub reset: bool,

    /// Print the current emotion and history stats, then exit
    #[arg(long)]
    pub status: bool,

    /// Write this user's emotion history to a CSV file, then exit
    #[arg(long, value_name = "PATH")]
    pub export_csv: Option<String>,

    /// Use the current emotion once to print music search links, then clear it
    #[arg(long)]
    pub recommend: bool,

    /// Process camera frames without opening a window
    #[arg(long)]
    pub headless: bool,

    /// Stop after this many processed frames (headless mode)
    #[arg(long)]
    pub frames: Option<usize>,
}
