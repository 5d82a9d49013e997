//! Command-line interface for xmlschema-docpath

#[cfg(feature = "cli")]
use clap::{Parser, Subcommand};

#[cfg(feature = "cli")]
use std::fs;
#[cfg(feature = "cli")]
use std::path::PathBuf;
#[cfg(feature = "cli")]
use std::sync::Arc;

#[cfg(feature = "cli")]
use tracing_subscriber::EnvFilter;

#[cfg(feature = "cli")]
use xmlschema_docpath::{load_model_file, read_file, walk_str, AutomatonGenerator, PathFinder, QName};

#[cfg(feature = "cli")]
#[derive(Parser, Debug)]
#[command(name = "xmlschema-docpath")]
#[command(author, version, about = "Match XML documents against schema content models", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[cfg(feature = "cli")]
#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate the automaton of a root element and display it
    Inspect {
        /// Path to the JSON model description
        #[arg(short, long, value_name = "MODEL")]
        model: PathBuf,

        /// Root element in Clark notation, e.g. {urn:example}root
        #[arg(short, long)]
        root: String,
    },

    /// Walk an XML document and display the matched document nodes
    Walk {
        /// Path to the JSON model description
        #[arg(short, long, value_name = "MODEL")]
        model: PathBuf,

        /// Root element in Clark notation, e.g. {urn:example}root
        #[arg(short, long)]
        root: String,

        /// Path to the XML file to walk
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Parse the whole document with roxmltree instead of streaming it
        #[arg(long)]
        dom: bool,

        /// Also list the path steps
        #[arg(short, long)]
        steps: bool,
    },
}

#[cfg(feature = "cli")]
fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Inspect { model, root } => cmd_inspect(model, root),
        Commands::Walk {
            model,
            root,
            file,
            dom,
            steps,
        } => cmd_walk(model, root, file, dom, steps),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

#[cfg(feature = "cli")]
fn cmd_inspect(model_path: PathBuf, root: String) -> Result<(), Box<dyn std::error::Error>> {
    let schema = load_model_file(&model_path)?;
    let root: QName = root.parse()?;
    let automaton = AutomatonGenerator::new(&schema).generate_global(&root)?;

    println!("xmlschema-docpath v{}", xmlschema_docpath::VERSION);
    println!();
    println!("Automaton for {} ({} nodes):", root, automaton.len());
    print!("{}", automaton);
    Ok(())
}

#[cfg(feature = "cli")]
fn cmd_walk(
    model_path: PathBuf,
    root: String,
    file: PathBuf,
    dom: bool,
    show_steps: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let schema = load_model_file(&model_path)?;
    let root: QName = root.parse()?;
    let automaton = Arc::new(AutomatonGenerator::new(&schema).generate_global(&root)?);

    let mut finder = PathFinder::new(automaton);
    let result = if dom {
        let xml = fs::read_to_string(&file)?;
        walk_str(&xml, &mut finder)
    } else {
        read_file(&file, &mut finder)
    };

    if let Err(e) = result {
        println!("✗ Document does not match");
        println!();
        println!("{}", e);
        println!();
        println!("Matched so far:");
        print!("{}", finder.path());
        std::process::exit(1);
    }

    let stats = finder.stats();
    let path = finder.into_path();
    println!("✓ Document matches");
    println!();
    print!("{}", path);
    println!();
    println!("Statistics:");
    println!("  Events: {}", stats.events);
    println!("  Document Nodes: {}", path.len());
    println!("  Decision Points: {}", stats.decisions);
    println!("  Backtracks: {}", stats.backtracks);

    if show_steps {
        println!();
        println!("Steps:");
        for (index, step) in path.steps().iter().enumerate() {
            let mut line = format!("  {:>4} {} {} #{}", index, step.direction, step.doc, step.iteration);
            if let Some(position) = step.position {
                line.push_str(&format!(" @{}", position));
            }
            if let Some(name) = &step.name {
                line.push_str(&format!(" {}", name));
            }
            if let Some(text) = &step.text {
                line.push_str(&format!(" {:?}", text));
            }
            println!("{}", line);
        }
    }
    Ok(())
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI feature not enabled. Rebuild with --features cli");
    std::process::exit(1);
}
