use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use facereg_core::{recognize_frame, FaceRegistry, MultiFacePolicy, OnnxProvider, DEFAULT_TOLERANCE};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "facereg", version, about = "Manage known faces and recognize images")]
struct Cli {
    /// Known-faces directory
    #[arg(long, env = "FACEREG_FACES_DIR", default_value = "static/image/faces", global = true)]
    faces_dir: PathBuf,
    /// Directory containing det_10g.onnx and w600k_r50.onnx
    #[arg(long, env = "FACEREG_MODEL_DIR", global = true)]
    model_dir: Option<PathBuf>,
    /// Maximum embedding distance for a match
    #[arg(long, default_value_t = DEFAULT_TOLERANCE, global = true)]
    tolerance: f32,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List reference images in the known-faces directory
    List,
    /// Register a reference photo under a name
    Add {
        /// Image file holding exactly one face
        image: PathBuf,
        /// Name the face is known by
        #[arg(short, long)]
        name: String,
        /// Accept photos with several faces and keep the first
        #[arg(long)]
        use_first: bool,
    },
    /// Remove a reference image by filename
    Remove {
        filename: String,
    },
    /// Recognize every face in an image and print the results as JSON
    Recognize {
        image: PathBuf,
    },
    /// Load every reference image and report how many faces are known
    Rebuild,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let registry = FaceRegistry::new(&cli.faces_dir, cli.tolerance);
    let model_dir = cli.model_dir.clone().unwrap_or_else(facereg_core::default_model_dir);

    match cli.command {
        Commands::List => {
            let files = registry.list_known_files()?;
            if files.is_empty() {
                println!("No faces registered in {}", registry.dir().display());
            }
            for file in files {
                println!("{:<30} {}", file.name, file.filename);
            }
        }
        Commands::Add { image, name, use_first } => {
            let mut provider = load_provider(&model_dir)?;
            let bytes = std::fs::read(&image).with_context(|| format!("reading {}", image.display()))?;
            let policy = if use_first {
                MultiFacePolicy::UseFirst
            } else {
                MultiFacePolicy::Reject
            };
            let original = original_filename(&image)?;
            let filename = registry.register(&mut provider, &name, &original, &bytes, policy)?;
            println!("Registered \"{name}\" as {filename}");
        }
        Commands::Remove { filename } => {
            let mut provider = load_provider(&model_dir)?;
            registry.delete(&mut provider, &filename)?;
            println!("Removed {filename}");
        }
        Commands::Recognize { image } => {
            let mut provider = load_provider(&model_dir)?;
            let count = registry.rebuild(&mut provider)?;
            tracing::debug!(count, "known faces loaded");
            let frame = image::open(&image).with_context(|| format!("decoding {}", image.display()))?;
            let results = recognize_frame(&mut provider, &registry, &frame)?;
            println!("{}", serde_json::to_string_pretty(&results)?);
        }
        Commands::Rebuild => {
            let mut provider = load_provider(&model_dir)?;
            let count = registry.rebuild(&mut provider)?;
            println!("{count} known faces in {}", registry.dir().display());
            for name in registry.names() {
                println!("  {name}");
            }
        }
    }

    Ok(())
}

fn load_provider(model_dir: &Path) -> Result<OnnxProvider> {
    OnnxProvider::load(model_dir).with_context(|| format!("loading models from {}", model_dir.display()))
}

fn original_filename(path: &Path) -> Result<String> {
    match path.file_name().and_then(|n| n.to_str()) {
        Some(name) => Ok(name.to_string()),
        None => bail!("{} has no usable file name", path.display()),
    }
}
