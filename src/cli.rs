// CLI argument definitions.
//
// Kept in its own file because build.rs includes it to generate man pages
// without linking the rest of the crate.

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "voxbridge")]
#[command(author, version, about = "Push-to-talk dictation for Wayland")]
#[command(long_about = "
Voxbridge is a push-to-talk dictation tool for Wayland.
Hold a hotkey to record, release to transcribe, reformat via a local
LLM, and insert the text into the focused application.

Everything runs on this machine: speech goes through whisper.cpp and
formatting through an Ollama model, with no cloud services involved.

Getting started:
  1. Join the input group (sudo usermod -aG input $USER), then re-login
  2. Install wl-clipboard and ydotool, and start the ydotool daemon
  3. voxbridge setup --download   checks the environment, fetches the model
  4. voxbridge daemon             starts listening for the hotkey

Hold Right Alt (the default key) while speaking, release to insert the
text. Without ydotool the text is left on the clipboard for manual paste.
")]
pub struct Cli {
    /// Config file to use instead of the default location
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<std::path::PathBuf>,

    /// More logging; repeat for trace output
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Log errors only
    #[arg(short, long)]
    pub quiet: bool,

    /// Whisper model for this run (tiny, base, small, medium, large-v3, ...)
    #[arg(long, value_name = "MODEL")]
    pub model: Option<String>,

    /// Push-to-talk key for this run (RIGHTALT, SCROLLLOCK, F13, ...)
    #[arg(long, value_name = "KEY")]
    pub hotkey: Option<String>,

    /// Skip LLM formatting and inject raw transcripts
    #[arg(long)]
    pub no_format: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the daemon (the default when no command is given)
    Daemon,

    /// Check dependencies, write a starter config, optionally fetch the model
    Setup {
        /// Download the whisper model if missing
        #[arg(long)]
        download: bool,
    },

    /// Pull the formatter model into Ollama
    Pull {
        /// Model to pull (defaults to the configured formatter model)
        model: Option<String>,
    },

    /// Transcribe a WAV file and print the text
    Transcribe {
        /// Audio file to transcribe
        file: std::path::PathBuf,
    },

    /// Reformat text through the LLM (argument or stdin)
    Format {
        /// Text to reformat (reads stdin when omitted)
        text: Option<String>,
    },

    /// Print the effective configuration
    Config,

    /// Print the daemon state, for Waybar and scripts
    Status {
        /// Keep running and print every state change
        #[arg(long)]
        follow: bool,

        /// "text" or "json" (Waybar custom module shape)
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Drive recording externally (compositor keybindings, scripts)
    Record {
        #[command(subcommand)]
        action: RecordAction,
    },
}

#[derive(Subcommand)]
pub enum RecordAction {
    /// Begin a recording session (SIGUSR1 to the daemon)
    Start,
    /// End recording and run the pipeline (SIGUSR2 to the daemon)
    Stop,
    /// Start or stop depending on the current state
    Toggle,
}
