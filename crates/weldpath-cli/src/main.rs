//! weldpath CLI - plan weld repairs from scanned damage meshes
//!
//! Meshes are read as JSON (`vertices`, `indices`, optional `normals`) and
//! plans are written as JSON. Settings come from a TOML file; `weldpath
//! config` prints the defaults.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;
use weldpath::slicer::{CurveId, TriangleMesh};
use weldpath::{build_surface_layers, plan_repair, PlannerSettings};

#[derive(Parser)]
#[command(name = "weldpath")]
#[command(about = "Weld repair toolpath planner", long_about = None)]
struct Cli {
    /// Log debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Plan a repair and write the layers, path and program as JSON
    Plan {
        /// Damage mesh (JSON)
        #[arg(short, long)]
        mesh: PathBuf,
        /// Planner settings (TOML); defaults when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Output file; stdout when omitted
        #[arg(short, long)]
        out: Option<PathBuf>,
        /// Curve to exclude, as `layer:index`; repeatable
        #[arg(short, long = "delete", value_parser = parse_curve_id)]
        deletions: Vec<CurveId>,
    },
    /// Build offset surface layers and write them as JSON point clouds
    Surface {
        /// Damage mesh (JSON)
        #[arg(short, long)]
        mesh: PathBuf,
        /// Number of layers
        #[arg(short = 'n', long, default_value_t = 3)]
        layers: usize,
        /// Planner settings (TOML); defaults when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Output file; stdout when omitted
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Print the default settings as TOML
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Plan {
            mesh,
            config,
            out,
            deletions,
        } => {
            let settings = load_settings(config.as_deref())?;
            let mesh = load_mesh(&mesh)?;
            let plan = plan_repair(&mesh, &settings, &deletions, None)?;
            for (layer, contour, failure) in plan.unprocessed() {
                eprintln!("layer {layer} contour {contour}: {failure}");
            }
            write_output(out.as_deref(), &serde_json::to_string_pretty(&plan)?)?;
        }
        Commands::Surface {
            mesh,
            layers,
            config,
            out,
        } => {
            if layers == 0 {
                bail!("--layers must be at least 1");
            }
            let settings = load_settings(config.as_deref())?;
            let mesh = load_mesh(&mesh)?;
            let clouds = build_surface_layers(&mesh, &settings, layers)?;
            write_output(out.as_deref(), &serde_json::to_string_pretty(&clouds)?)?;
        }
        Commands::Config => {
            print!("{}", PlannerSettings::default().to_toml_string()?);
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn parse_curve_id(s: &str) -> std::result::Result<CurveId, String> {
    let (layer, index) = s
        .split_once(':')
        .ok_or_else(|| format!("expected layer:index, got '{s}'"))?;
    let layer = layer
        .trim()
        .parse()
        .map_err(|e| format!("bad layer '{layer}': {e}"))?;
    let index = index
        .trim()
        .parse()
        .map_err(|e| format!("bad index '{index}': {e}"))?;
    Ok(CurveId::new(layer, index))
}

fn load_settings(path: Option<&Path>) -> Result<PlannerSettings> {
    let Some(path) = path else {
        return Ok(PlannerSettings::default());
    };
    let text =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    PlannerSettings::from_toml_str(&text).with_context(|| format!("parsing {}", path.display()))
}

fn load_mesh(path: &Path) -> Result<TriangleMesh> {
    let json = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let mesh: TriangleMesh =
        serde_json::from_str(&json).with_context(|| format!("parsing {}", path.display()))?;
    info!(
        vertices = mesh.num_vertices(),
        triangles = mesh.num_triangles(),
        "loaded mesh"
    );
    Ok(mesh)
}

fn write_output(path: Option<&Path>, text: &str) -> Result<()> {
    match path {
        Some(path) => {
            fs::write(path, text).with_context(|| format!("writing {}", path.display()))?;
            info!(path = %path.display(), "wrote output");
        }
        None => println!("{text}"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_curve_id() {
        assert_eq!(parse_curve_id("2:1").unwrap(), CurveId::new(2, 1));
        assert!(parse_curve_id("2").is_err());
        assert!(parse_curve_id("a:1").is_err());
    }

    #[test]
    fn test_cli_parses_plan() {
        let cli = Cli::try_parse_from([
            "weldpath", "plan", "--mesh", "m.json", "-d", "0:0", "-d", "1:2", "-v",
        ])
        .unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::Plan { deletions, .. } => assert_eq!(deletions.len(), 2),
            _ => panic!("expected plan"),
        }
    }
}
