use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cad_ai::{
    GeminiClient, GeminiConfig, GenerationRequest, LanguageModel, ModelError, ModelRequest,
    ParameterValue, ScriptGenerator, build_prompt,
};
use cad_artifacts::{ArtifactStore, DEFAULT_COMPILER, MeshConverter};
use cad_pipeline::Pipeline;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

type DynError = Box<dyn Error>;

#[derive(Parser)]
#[command(name = "cad", about = "Text-to-CAD generation from the command line", long_about = None)]
struct Cli {
    /// Directory that receives generated scripts and meshes.
    #[arg(long, global = true, default_value = "artifacts")]
    work_dir: PathBuf,

    /// Geometry compiler executable.
    #[arg(long, global = true, default_value = DEFAULT_COMPILER)]
    compiler: String,

    /// Compiler timeout in seconds; 0 waits indefinitely.
    #[arg(long, global = true, default_value_t = 120)]
    timeout_secs: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the instruction and content that would be sent to the model
    Prompt(Request),

    /// Generate scripts (and a mesh, for free-text prompts)
    Generate(Request),

    /// Convert an OpenSCAD file into an STL mesh
    Convert {
        /// OpenSCAD source file
        #[arg(short, long)]
        input: PathBuf,

        /// Destination mesh; defaults to the input path with an `.stl` extension
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Args)]
struct Request {
    /// Free-text object description
    #[arg(short, long, conflicts_with_all = ["size", "fillet"])]
    prompt: Option<String>,

    /// Cube edge length in millimetres
    #[arg(long)]
    size: Option<String>,

    /// Fillet radius in millimetres
    #[arg(long)]
    fillet: Option<String>,
}

impl Request {
    fn into_generation_request(self) -> GenerationRequest {
        match self.prompt {
            Some(prompt) => GenerationRequest::prompt(prompt),
            None => GenerationRequest::parameters(
                self.size.map(ParameterValue::Text),
                self.fillet.map(ParameterValue::Text),
            ),
        }
    }
}

/// Stands in for the model when no API key is configured, so offline
/// subcommands still work.
struct Offline;

#[async_trait]
impl LanguageModel for Offline {
    async fn complete(&self, _request: ModelRequest<'_>) -> Result<String, ModelError> {
        Err(ModelError::Unavailable("GEMINI_API_KEY is not set".to_string()))
    }
}

#[tokio::main]
async fn main() -> Result<(), DynError> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Prompt(request) => {
            let plan = build_prompt(&request.into_generation_request())?;
            println!("{}", plan.instruction);
            for block in &plan.content {
                println!("\n{block}");
            }
        }
        Commands::Generate(request) => {
            let pipeline = pipeline(&cli.work_dir, &cli.compiler, cli.timeout_secs)?;
            match request.into_generation_request() {
                GenerationRequest::Prompt { prompt } => {
                    let artifacts = pipeline.generate_models(&prompt).await?;
                    tracing::info!(id = %artifacts.id, "models generated");
                    println!("id:        {}", artifacts.id);
                    println!("openscad:  {}", artifacts.scad_path.display());
                    println!("catscript: {}", artifacts.catscript_path.display());
                    println!("mesh:      {}", artifacts.stl_path.display());
                }
                GenerationRequest::Parameters { size, fillet } => {
                    let artifact = pipeline.generate_script(size, fillet).await?;
                    tracing::info!(id = %artifact.id, "cube script generated");
                    println!("id:        {}", artifact.id);
                    println!("catscript: {}", artifact.catscript_path.display());
                }
            }
        }
        Commands::Convert { input, output } => {
            let code = fs::read_to_string(&input)?;
            let pipeline = pipeline(&cli.work_dir, &cli.compiler, cli.timeout_secs)?;
            let mesh = pipeline.convert(&code).await?;
            let output = mesh_destination(&input, output);
            fs::write(&output, &mesh.bytes)?;
            tracing::info!(id = %mesh.id, output = %output.display(), "mesh written");
            println!("wrote {} ({} bytes)", output.display(), mesh.bytes.len());
        }
    }

    Ok(())
}

fn pipeline(work_dir: &Path, compiler: &str, timeout_secs: u64) -> Result<Pipeline, DynError> {
    let model: Arc<dyn LanguageModel> = match std::env::var("GEMINI_API_KEY") {
        Ok(key) if !key.trim().is_empty() => {
            tracing::debug!("using the Gemini model");
            let mut config = GeminiConfig::new(key);
            if let Ok(model) = std::env::var("GEMINI_MODEL") {
                config.model = model;
            }
            Arc::new(GeminiClient::new(config)?)
        }
        _ => {
            tracing::debug!("GEMINI_API_KEY not set; model calls will fail");
            Arc::new(Offline)
        }
    };
    let converter = MeshConverter::new(compiler)
        .with_timeout((timeout_secs > 0).then(|| Duration::from_secs(timeout_secs)));

    Ok(Pipeline::new(
        ScriptGenerator::new(model),
        ArtifactStore::new(work_dir),
        converter,
    ))
}

fn mesh_destination(input: &Path, output: Option<PathBuf>) -> PathBuf {
    output.unwrap_or_else(|| input.with_extension("stl"))
}
