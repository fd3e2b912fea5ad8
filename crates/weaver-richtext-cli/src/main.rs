use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result, WrapErr};
use weaver_richtext_core::{CorePlugin, EditorConfig, MemorySelection, Plugin, Session};

mod script;

#[derive(Parser)]
#[command(version, about = "Weaver rich text - replay edits against HTML documents", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Editor config (JSON); defaults apply to missing keys
    #[arg(long, global = true, env = "WEAVER_RICHTEXT_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay an edit script over a document
    Edit {
        /// HTML document to load
        input: PathBuf,

        /// Edit script (JSON array of steps)
        #[arg(long)]
        script: PathBuf,

        /// Write the result here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Load and normalize a document, printing the canonical markup
    Normalize {
        input: PathBuf,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print the serialized node tree of a document as JSON
    Serialize { input: PathBuf },
}

fn main() -> Result<()> {
    init_miette();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Edit {
            input,
            script,
            output,
        } => {
            let mut session = open(&input, config)?;
            let source = read(&script)?;
            let steps = script::parse(&source)?;
            let report = script::replay(&mut session, &steps)?;
            eprintln!(
                "replayed {} steps ({} unbound keys), {} undo steps",
                report.steps,
                report.unbound_keys,
                session.history_len()
            );
            emit(&session.content_html()?, output.as_deref())?;
        }
        Commands::Normalize { input, output } => {
            let session = open(&input, config)?;
            emit(&session.content_html()?, output.as_deref())?;
        }
        Commands::Serialize { input } => {
            let session = open(&input, config)?;
            let doc = session.document();
            let nodes = doc
                .children(doc.root())
                .iter()
                .map(|&child| session.serialize_node(child))
                .collect::<Result<Vec<_>, _>>()?;
            let json = serde_json::to_string_pretty(&nodes).into_diagnostic()?;
            println!("{json}");
        }
    }

    Ok(())
}

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .into_diagnostic()
        .wrap_err_with(|| format!("failed to read {}", path.display()))
}

fn load_config(path: Option<&Path>) -> Result<EditorConfig> {
    let Some(path) = path else {
        return Ok(EditorConfig::default());
    };
    let config = EditorConfig::from_json(&read(path)?)
        .wrap_err_with(|| format!("in config {}", path.display()))?;
    tracing::debug!(?config, "loaded editor config");
    Ok(config)
}

fn open(input: &Path, config: EditorConfig) -> Result<Session> {
    let plugins: Vec<Box<dyn Plugin>> = vec![Box::new(CorePlugin)];
    let mut session = Session::new(config, &plugins, Box::new(MemorySelection::new()))?;
    session.reset_content(&read(input)?)?;
    tracing::info!(input = %input.display(), "loaded document");
    Ok(session)
}

fn emit(html: &str, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => std::fs::write(path, html)
            .into_diagnostic()
            .wrap_err_with(|| format!("failed to write {}", path.display())),
        None => {
            println!("{html}");
            Ok(())
        }
    }
}

fn init_miette() {
    let hooked = miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .with_cause_chain()
                .color(true)
                .context_lines(5)
                .tab_width(2)
                .break_words(true)
                .build(),
        )
    }));
    if hooked.is_err() {
        eprintln!("miette hook was already installed");
    }
    miette::set_panic_hook();
}
