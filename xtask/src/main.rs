use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{exit, Command};

use clap::{Parser, Subcommand, ValueEnum};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

const RUNTIME_PACKAGE: &str = "invocation_lambda";
const RUNTIME_BIN: &str = "invocation_runtime";
const DIST_DIR: &str = "dist";

#[derive(Parser)]
#[command(
    name = "xtask",
    about = "Task runner for the invocation wrapper workspace",
    long_about = "CI checks and Lambda packaging for the invocation wrapper workspace."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run CI checks
    Ci {
        #[arg(value_enum, default_value_t = CiJob::All)]
        job: CiJob,
    },
    /// Build the runtime binary and zip it as a Lambda `bootstrap`
    LambdaPackage {
        /// Compilation target triple for the Lambda binary
        #[arg(long, env = "LAMBDA_TARGET", default_value = "x86_64-unknown-linux-gnu")]
        target: String,
        #[arg(value_enum, long, default_value_t = BuildProfile::Release)]
        profile: BuildProfile,
        /// Output directory for the zip
        #[arg(long, default_value = DIST_DIR)]
        out_dir: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum CiJob {
    /// rustfmt --check
    Fmt,
    /// clippy with warnings denied
    Clippy,
    /// Tests for every crate
    Test,
    /// fmt + clippy + test
    All,
}

#[derive(Clone, Copy, ValueEnum)]
enum BuildProfile {
    Debug,
    Release,
}

impl BuildProfile {
    fn dir_name(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Release => "release",
        }
    }

    fn as_cargo_flag(self) -> Option<&'static str> {
        match self {
            Self::Debug => None,
            Self::Release => Some("--release"),
        }
    }
}

type TaskResult = Result<(), String>;

fn step(label: &str) {
    eprintln!("\n=== {label} ===");
}

fn run_cargo(args: &[&str]) -> TaskResult {
    eprintln!("+ cargo {}", args.join(" "));
    let status = Command::new("cargo")
        .args(args)
        .status()
        .map_err(|error| format!("failed to execute cargo: {error}"))?;
    if status.success() {
        Ok(())
    } else {
        Err(format!(
            "`cargo {}` exited with {}",
            args.join(" "),
            status.code().unwrap_or(1)
        ))
    }
}

fn ci(job: CiJob) -> TaskResult {
    if matches!(job, CiJob::Fmt | CiJob::All) {
        step("Check formatting");
        run_cargo(&["fmt", "--all", "--", "--check"])?;
    }
    if matches!(job, CiJob::Clippy | CiJob::All) {
        step("Clippy");
        run_cargo(&[
            "clippy",
            "--workspace",
            "--all-targets",
            "--all-features",
            "--",
            "-D",
            "warnings",
        ])?;
    }
    if matches!(job, CiJob::Test | CiJob::All) {
        for package in ["invocation_core", RUNTIME_PACKAGE] {
            step(&format!("Test {package}"));
            run_cargo(&["test", "-p", package])?;
        }
    }
    Ok(())
}

fn package_runtime(target: &str, profile: BuildProfile, out_dir: &Path) -> TaskResult {
    ensure_rust_target_installed(target)?;

    step("Build runtime binary");
    let mut cargo_args = vec![
        "build",
        "-p",
        RUNTIME_PACKAGE,
        "--target",
        target,
        "--bin",
        RUNTIME_BIN,
    ];
    if let Some(flag) = profile.as_cargo_flag() {
        cargo_args.push(flag);
    }
    run_cargo(&cargo_args)?;

    step("Package bootstrap zip");
    let binary = Path::new("target")
        .join(target)
        .join(profile.dir_name())
        .join(binary_name(RUNTIME_BIN, target));
    fs::create_dir_all(out_dir)
        .map_err(|error| format!("failed to create '{}': {error}", out_dir.display()))?;
    let zip_path = out_dir.join("runtime.zip");
    package_lambda_zip(&binary, &zip_path)?;

    eprintln!("\nPackaged artifact:\n- {}", zip_path.display());
    Ok(())
}

fn ensure_rust_target_installed(target: &str) -> TaskResult {
    let output = match Command::new("rustup")
        .args(["target", "list", "--installed"])
        .output()
    {
        Ok(output) => output,
        Err(error) => {
            eprintln!("warning: could not run rustup ({error}); skipping target check");
            return Ok(());
        }
    };

    let installed = String::from_utf8_lossy(&output.stdout);
    if installed.lines().any(|line| line.trim() == target) {
        Ok(())
    } else {
        Err(format!(
            "rust target `{target}` is not installed; run `rustup target add {target}`"
        ))
    }
}

fn binary_name(bin_name: &str, target: &str) -> String {
    if target.contains("windows") {
        format!("{bin_name}.exe")
    } else {
        bin_name.to_string()
    }
}

fn package_lambda_zip(binary_path: &Path, zip_path: &Path) -> TaskResult {
    let binary = fs::read(binary_path).map_err(|error| {
        format!("failed to read lambda binary '{}': {error}", binary_path.display())
    })?;
    let file = fs::File::create(zip_path)
        .map_err(|error| format!("failed to create '{}': {error}", zip_path.display()))?;

    let mut zip = ZipWriter::new(file);
    let options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(0o755);
    zip.start_file("bootstrap", options)
        .map_err(|error| format!("failed to start bootstrap entry: {error}"))?;
    zip.write_all(&binary)
        .map_err(|error| format!("failed to write bootstrap entry: {error}"))?;
    zip.finish()
        .map_err(|error| format!("failed to finish lambda zip: {error}"))?;
    Ok(())
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Ci { job } => ci(job).map(|()| eprintln!("\nCI job passed.")),
        Commands::LambdaPackage {
            target,
            profile,
            out_dir,
        } => package_runtime(&target, profile, &out_dir),
    };

    if let Err(message) = result {
        eprintln!("error: {message}");
        exit(1);
    }
}
