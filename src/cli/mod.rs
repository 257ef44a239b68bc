//! CLI subcommands — init, validate, compile, plan, verify, schema, completions.

use crate::core::{codegen, compiler, config, fingerprint, parser, planner, state, types};
use crate::core::error::CompileError;
use crate::core::resolver::SourceSet;
use clap::{CommandFactory, Parser, Subcommand};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(
    name = "flowplan",
    version,
    about = "Declarative workflow compiler — lowers flows into numbered execution plans"
)]
pub struct Cli {
    /// Log filter (overrides RUST_LOG), e.g. "debug" or "flowplan=trace"
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a new flowplan project
    Init {
        /// Directory to initialize (default: current)
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Validate one source file without resolving its dependencies
    Validate {
        /// Source file to validate
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Compile a flow or operation and write its artifact
    Compile {
        /// Root source file
        #[arg(short, long)]
        file: PathBuf,

        /// Extra glob of candidate source files (repeatable)
        #[arg(short, long = "path")]
        paths: Vec<String>,

        /// Artifact path (default: <output.dir>/<name>.plan.json)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Config file (default: ./flowplan.toml when present)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Print every plan instruction of a compilation
    Plan {
        /// Root source file
        #[arg(short, long)]
        file: PathBuf,

        /// Extra glob of candidate source files (repeatable)
        #[arg(short, long = "path")]
        paths: Vec<String>,

        /// Config file (default: ./flowplan.toml when present)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Print the runtime JSON instead of the listing
        #[arg(long)]
        json: bool,
    },

    /// Check a written artifact against its recorded fingerprint
    Verify {
        /// Artifact file
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Print the JSON Schema of the source file format
    Schema,

    /// Generate a shell completion script
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

/// Dispatch a CLI command.
pub fn dispatch(cmd: Commands) -> Result<(), String> {
    match cmd {
        Commands::Init { path } => cmd_init(&path),
        Commands::Validate { file } => cmd_validate(&file),
        Commands::Compile {
            file,
            paths,
            output,
            config,
        } => cmd_compile(&file, &paths, output.as_deref(), config.as_deref()),
        Commands::Plan {
            file,
            paths,
            config,
            json,
        } => cmd_plan(&file, &paths, config.as_deref(), json),
        Commands::Verify { file } => cmd_verify(&file),
        Commands::Schema => cmd_schema(),
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "flowplan", &mut std::io::stdout());
            Ok(())
        }
    }
}

const CONFIG_TEMPLATE: &str = r#"[sources]
paths = ["lib/**/*.yaml"]

[output]
dir = "build"
pretty = true
"#;

const FLOW_TEMPLATE: &str = r#"namespace: hello
flow:
  name: greet_all
  inputs:
    - name: names
  workflow:
    - name: greet
      do: greet
      parallel_loop:
        for: who
        in: names
      inputs:
        - name: who
      publish:
        - name: greeting
          value: ${greeting}
      aggregate:
        - name: greetings
          value: "${ map(lambda x:str(x['greeting']), branches_context) }"
"#;

const OPERATION_TEMPLATE: &str = r#"namespace: hello
operation:
  name: greet
  inputs:
    - name: who
  outputs:
    - name: greeting
      value: ${greeting}
  action:
    script: "greeting = 'hello ' + who"
"#;

fn cmd_init(path: &Path) -> Result<(), String> {
    let config_path = path.join(config::CONFIG_FILE);
    if config_path.exists() {
        return Err(format!("{} already exists", config_path.display()));
    }

    let lib_dir = path.join("lib");
    std::fs::create_dir_all(&lib_dir).map_err(|e| format!("cannot create lib dir: {}", e))?;

    let files = [
        (config_path, CONFIG_TEMPLATE),
        (lib_dir.join("greet_all.yaml"), FLOW_TEMPLATE),
        (lib_dir.join("greet.yaml"), OPERATION_TEMPLATE),
    ];
    for (file, content) in &files {
        std::fs::write(file, content)
            .map_err(|e| format!("cannot write {}: {}", file.display(), e))?;
    }

    println!("Initialized flowplan project at {}", path.display());
    for (file, _) in &files {
        println!("  Created: {}", file.display());
    }
    Ok(())
}

fn cmd_validate(file: &Path) -> Result<(), String> {
    let source = parser::parse_source_file(file).map_err(|e| e.to_string())?;
    let errors = parser::validate_source(&source);
    if !errors.is_empty() {
        for e in &errors {
            eprintln!("  - {}", e);
        }
        return Err(format!("{} validation error(s)", errors.len()));
    }

    let origin = file.display().to_string();
    let exec = parser::into_executable(&source, &origin).map_err(|e| e.to_string())?;
    let plan = planner::plan_executable(&exec).map_err(|e| e.to_string())?;

    println!(
        "OK: {} {} ({} instructions)",
        exec.kind(),
        exec.name(),
        plan.len()
    );
    Ok(())
}

/// Load the root and every candidate source the patterns match.
fn load_sources(
    file: &Path,
    paths: &[String],
    config_path: Option<&Path>,
) -> Result<(types::Executable, SourceSet, config::CompilerConfig), String> {
    let cfg = config::load_or_default(config_path)?;
    let root = parser::load_executable(file).map_err(|e| e.to_string())?;

    let mut patterns = cfg.source_patterns(paths);
    if patterns.is_empty() {
        let dir = file.parent().unwrap_or(Path::new("."));
        patterns.push(dir.join("*.yaml").to_string_lossy().into_owned());
    }

    let root_path = std::fs::canonicalize(file).ok();
    let mut candidates = SourceSet::new();
    for candidate in config::expand_globs(&patterns)? {
        if std::fs::canonicalize(&candidate).ok() == root_path {
            continue;
        }
        let exec = parser::load_executable(&candidate).map_err(|e| e.to_string())?;
        if exec.name() == root.name() {
            return Err(CompileError::DuplicateExecutable {
                name: root.name().to_string(),
            }
            .to_string());
        }
        candidates.insert(exec).map_err(|e| e.to_string())?;
    }
    tracing::debug!(candidates = candidates.len(), "loaded sources");

    Ok((root, candidates, cfg))
}

fn cmd_compile(
    file: &Path,
    paths: &[String],
    output: Option<&Path>,
    config_path: Option<&Path>,
) -> Result<(), String> {
    let (root, candidates, cfg) = load_sources(file, paths, config_path)?;
    let artifact = compiler::compile(&root, &candidates).map_err(|e| e.to_string())?;

    let out = match output {
        Some(p) => p.to_path_buf(),
        None => state::artifact_path(&cfg.output_dir(), &root.name().to_string()),
    };
    let fp = state::save_artifact(&out, &artifact, cfg.output.pretty)?;

    println!(
        "Compiled {}: {} plan(s) → {}",
        root.name(),
        artifact.dependencies.len() + 1,
        out.display()
    );
    println!("  fingerprint: {}", fp);
    Ok(())
}

fn cmd_plan(
    file: &Path,
    paths: &[String],
    config_path: Option<&Path>,
    json: bool,
) -> Result<(), String> {
    let (root, candidates, _) = load_sources(file, paths, config_path)?;
    let artifact = compiler::compile(&root, &candidates).map_err(|e| e.to_string())?;

    if json {
        let doc = codegen::artifact_document(&artifact);
        let text = serde_json::to_string_pretty(&doc).map_err(|e| format!("serialize error: {}", e))?;
        println!("{}", text);
        return Ok(());
    }

    let fingerprints = fingerprint::plan_fingerprints(&artifact);
    for (plan, (_, fp)) in artifact.plans().zip(&fingerprints) {
        print_plan(plan, fp);
    }
    println!("fingerprint: {}", fingerprint::fingerprint(&artifact));
    Ok(())
}

fn print_plan(plan: &types::ExecutionPlan, fp: &str) {
    println!(
        "{} ({}, begin {}) {}",
        plan.plan_id, plan.kind, plan.begin_step_id, fp
    );
    for step in plan.steps.values() {
        let mut markers = Vec::new();
        if step.is_split_step() {
            markers.push("split");
        }
        if step.is_async() {
            markers.push("async");
        }
        let markers = if markers.is_empty() {
            String::new()
        } else {
            format!(" [{}]", markers.join(", "))
        };
        println!(
            "  {:>4}  {:<18} {}{}",
            step.step_id,
            step.action.role(),
            step.name,
            markers
        );
        if let Some(navigation) = step.navigation() {
            for (result, nav) in navigation {
                match &nav.preset_result {
                    Some(r) if nav.is_terminal() => println!("        {} → end({})", result, r),
                    _ => println!("        {} → {}", result, nav.next_step_id),
                }
            }
        }
    }
    println!();
}

fn cmd_verify(file: &Path) -> Result<(), String> {
    let doc = state::load_document(file)?
        .ok_or_else(|| format!("{} not found", file.display()))?;
    let fp = state::verify_document(&doc)?;
    println!("OK: {} {}", file.display(), fp);
    Ok(())
}

fn cmd_schema() -> Result<(), String> {
    let schema = schemars::schema_for!(parser::SourceFile);
    let text = serde_json::to_string_pretty(&schema).map_err(|e| format!("serialize error: {}", e))?;
    println!("{}", text);
    Ok(())
}
