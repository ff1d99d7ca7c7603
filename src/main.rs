use std::fs;
use std::path::PathBuf;
use std::process;

use clap::Parser;
use log::info;

use vocalise::audio::write_wav_float;
use vocalise::speech::{DiskWordStore, ElevenLabsProvider};
use vocalise::{prepare, Config, Renderer, SpeechCache};

#[derive(Parser, Debug)]
#[command(name = "vocalise", version, about = "Sing the lyrics of a MusicXML score")]
struct Cli {
    /// MusicXML (partwise, version 4.0) score
    score: PathBuf,

    /// Part names to sing, exactly as written in the part list
    #[arg(required = true)]
    parts: Vec<String>,

    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output WAV (defaults to the score path with a .wav extension)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    if let Err(e) = run(&cli) {
        eprintln!("error: {}", e);
        process::exit(1);
    }
}

fn run(cli: &Cli) -> vocalise::Result<()> {
    let config = Config::load(cli.config.as_deref())?;
    let xml = fs::read_to_string(&cli.score)?;

    let parts = prepare(&xml, &cli.parts, &config)?;
    info!("Prepared {} parts from {}", parts.len(), cli.score.display());

    let cache = SpeechCache::new(
        ElevenLabsProvider::new(&config.voice),
        DiskWordStore::open(&config.cache.dir)?,
        &config.voice,
    );
    let lexicon = cache.resolve(&parts)?;

    let mix = Renderer::with_config(config.render.clone()).render(&parts, &lexicon)?;
    let output = cli
        .output
        .clone()
        .unwrap_or_else(|| cli.score.with_extension("wav"));
    write_wav_float(&output, &mix)?;
    info!("Wrote {:.2}s of audio to {}", mix.duration_secs(), output.display());
    Ok(())
}
