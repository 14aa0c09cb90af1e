use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use patchq::config::Config;
use patchq::patch::PatchDescriptor;
use patchq::queue;
use patchq::repo::{GitRepository, Repository};
use patchq::specdoc::{find_spec_file, SpecDocument};
use patchq::sync::{self, author, ExportOptions, PatchLayout};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "patchq")]
#[command(about = "Maintain patches on a patch-queue branch", long_about = None)]
#[command(version)]
struct Cli {
    /// Verbose command execution
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    action: Action,
}

#[derive(Subcommand)]
enum Action {
    /// Export the patch queue of the current branch into the patch
    /// directory and update the series file
    Export {
        /// Commit the regenerated patch directory
        #[arg(long)]
        commit: bool,

        /// Drop the patch-queue branch after exporting
        #[arg(long)]
        drop: bool,

        /// Do not prefix patch files with a running ordinal
        #[arg(long)]
        no_numbers: bool,

        /// Also update the spec document's patch declarations; without
        /// a path the spec file is discovered in the repository
        #[arg(long, num_args = 0..=1, default_missing_value = "")]
        spec: Option<PathBuf>,
    },

    /// Create a patch-queue branch from the patches in the patch
    /// directory
    Import {
        /// Import even if the patch-queue branch already exists
        #[arg(long)]
        force: bool,

        /// Go back this many commits in history when patches fail to
        /// apply
        #[arg(long)]
        time_machine: Option<usize>,
    },

    /// Switch to the patch-queue branch and rebase it against the
    /// current branch
    Rebase,

    /// Drop (delete) the patch queue of the current branch
    Drop,

    /// Apply a single patch on the patch-queue branch
    Apply {
        /// Patch file to apply
        patch: PathBuf,

        /// Topic (sub-directory) to group the patch under
        #[arg(long)]
        topic: Option<String>,
    },

    /// Switch between the base branch and its patch-queue branch
    Switch,
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();

    if let Err(err) = run(cli) {
        eprintln!("{} {err:#}", "error:".red().bold());
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let repo = GitRepository::open(".")?;
    let config = Config::load(repo.path())?;
    let pattern = config.queue_pattern();
    let current = repo.current_branch()?;

    match cli.action {
        Action::Export {
            commit,
            drop,
            no_numbers,
            spec,
        } => {
            let layout = PatchLayout::new(repo.path().join(&config.patch_dir));
            let options = ExportOptions {
                patch_numbers: !no_numbers && config.patch_numbers,
                path_exclude: config.exclude_regex(),
                commit: commit || config.commit,
                drop: drop || config.drop,
            };
            let report = sync::export_patches(&repo, &current, &layout, &pattern, &options)?;
            if report.nothing_to_do() {
                println!("{}", "No new patches - nothing to do.".yellow());
                return Ok(());
            }
            println!(
                "{} exported {} patches to {}",
                "✓".green(),
                report.patches.len(),
                layout.patch_dir.display()
            );

            let spec_path = match spec {
                Some(path) if path.as_os_str().is_empty() => {
                    Some(find_spec_file(repo.path(), None)?)
                }
                Some(path) => Some(path),
                None => config.spec_file.as_ref().map(|p| repo.path().join(p)),
            };
            if let Some(spec_path) = spec_path {
                let mut doc = SpecDocument::open(&spec_path)?;
                sync::update_spec_document(&mut doc, &report.patches, &layout.patch_dir)?;
                println!("{} updated {}", "✓".green(), spec_path.display());
            }
        }

        Action::Import {
            force,
            time_machine,
        } => {
            let layout = PatchLayout::new(repo.path().join(&config.patch_dir));
            let tries = time_machine.unwrap_or(config.time_machine).max(1);
            let queue = sync::import_series(
                &repo,
                &current,
                &layout.series_file,
                tries,
                force,
                &pattern,
            )?;
            println!(
                "{} patches listed in '{}' imported on '{}'",
                "✓".green(),
                layout.series_file.display(),
                queue
            );
        }

        Action::Rebase => queue::rebase_queue(&repo, &current, &pattern)?,

        Action::Drop => queue::drop_queue(&repo, &current, &pattern, &[])?,

        Action::Apply { patch, topic } => {
            let descriptor = PatchDescriptor::from_file(patch, 1, topic.clone())?;
            let fallback = author::fallback_identity();
            sync::apply_single(
                &repo,
                &current,
                &descriptor,
                &fallback,
                topic.as_deref(),
                &pattern,
            )?;
        }

        Action::Switch => queue::switch(&repo, &current, &pattern)?,
    }

    Ok(())
}
