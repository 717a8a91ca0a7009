use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use storyfork::config::Config;
use storyfork::generator::TextGenerator;
use storyfork::generator::http::HttpGenerator;
use storyfork::output::StoryOutput;
use storyfork::pipeline::{Pipeline, ProgressEvent, Stage, StoryInput};
use storyfork::source;

#[derive(Parser)]
#[command(name = "storyfork", author, version)]
#[command(about = "Turn linear prose into a branching story that always returns to its ending")]
struct Cli {
    /// Config file (.json or .toml); defaults are used when it is missing
    #[arg(short, long, global = true, default_value = "storyfork.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build the branching story and print it as JSON
    Build {
        /// Manuscript (.txt or .md, optional YAML front matter)
        input: PathBuf,

        /// Write the story here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Target age band: 6-8, 8-10, 10-12 or 12-14
        #[arg(long)]
        age: Option<String>,

        #[arg(long)]
        persona: Option<String>,

        #[arg(long)]
        title: Option<String>,

        #[arg(long)]
        author: Option<String>,

        /// Hide the progress bar
        #[arg(short, long)]
        quiet: bool,
    },

    /// Print the chunks' decision points without building a story
    Detect {
        input: PathBuf,
    },

    /// Print the JSON Schema of the story output
    Schema,

    /// Write a config file with every default filled in
    InitConfig {
        #[arg(default_value = "storyfork.json")]
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Build {
            input,
            output,
            age,
            persona,
            title,
            author,
            quiet,
        } => {
            let config = load_config(&cli.config)?;
            let manuscript = source::load(&input)?;
            let fm = manuscript.front_matter;
            let story_input = StoryInput {
                text: manuscript.text,
                title: title.or(fm.title),
                author: author.or(fm.author),
                target_age: age
                    .or(fm.target_age)
                    .unwrap_or_else(|| config.default_target_age.clone()),
                persona: persona
                    .or(fm.persona)
                    .unwrap_or_else(|| config.default_persona.clone()),
            };
            build(config, &story_input, output.as_deref(), quiet).await
        }
        Command::Detect { input } => {
            let config = load_config(&cli.config)?;
            let manuscript = source::load(&input)?;
            let pipeline = Pipeline::new(config)?;
            let (chunks, points, warnings) = pipeline.detect(&manuscript.text);
            let report = json!({
                "chunks": chunks.len(),
                "decisionPoints": points,
                "warnings": warnings,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Command::Schema => {
            println!("{}", serde_json::to_string_pretty(&StoryOutput::json_schema())?);
            Ok(())
        }
        Command::InitConfig { path } => {
            let path_str = path.to_string_lossy();
            Config::default().save(&path_str)?;
            info!("Wrote default configuration to {path_str}");
            Ok(())
        }
    }
}

fn load_config(path: &Path) -> Result<Config> {
    let config = Config::load(&path.to_string_lossy())?;
    config.validate().context("invalid configuration")?;
    Ok(config)
}

async fn build(
    config: Config,
    input: &StoryInput,
    output: Option<&Path>,
    quiet: bool,
) -> Result<()> {
    let generator = HttpGenerator::from_config(&config.generation)
        .context("failed to set up the text-generation client")?;

    let mut pipeline = Pipeline::new(config)?;
    if let Some(generator) = generator {
        info!("Scene summaries will be requested from {}", generator.name());
        pipeline = pipeline.with_generator(Arc::new(generator));
    }

    let (tx, mut rx) = mpsc::unbounded_channel();
    pipeline = pipeline.with_progress(tx);

    let bar = if quiet {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(Stage::ALL.len() as u64)
    };
    bar.set_style(
        ProgressStyle::default_bar()
            .template("  {bar:30.cyan/blue} {pos}/{len} {msg}")
            .context("invalid progress template")?
            .progress_chars("█▓░"),
    );
    let progress = {
        let bar = bar.clone();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                match event {
                    ProgressEvent::StageStarted { stage } => bar.set_message(stage.as_str()),
                    ProgressEvent::StageCompleted { .. } => bar.inc(1),
                }
            }
        })
    };

    let run = pipeline.run(input).await;
    // Dropping the pipeline closes the channel so the progress task ends.
    drop(pipeline);
    let _ = progress.await;
    bar.finish_and_clear();

    let story = StoryOutput::from_run(&run?);
    let json = serde_json::to_string_pretty(&story)?;
    match output {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("failed to write {}", path.display()))?;
            info!(
                "Wrote {} scenes and {} choices to {}",
                story.metadata.total_scenes,
                story.metadata.total_choices,
                path.display()
            );
        }
        None => println!("{json}"),
    }
    Ok(())
}
