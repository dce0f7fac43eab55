use anyhow::Result;
use bitmod::areas::repository::Repository;
use bitmod::artifacts::core::settings::Settings;
use bitmod::artifacts::diff::DiffEndpoint;
use bitmod::artifacts::diff::tree_diff::DiffFilter;
use bitmod::artifacts::merge::{ConflictSide, MergeOutcome};
use bitmod::artifacts::objects::object_id::ObjectId;
use bitmod::artifacts::submodule::root_module::UpdateOptions;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "BITMOD_LOG";

#[derive(Parser)]
#[command(
    name = "bitmod",
    version = "0.1.0",
    author = "Sami Barbut-Dica",
    about = "A git object store, index and submodule toolkit",
    long_about = "Reads and writes git repositories: loose objects, the staging index, \
    three-way merges and nested submodule checkouts. Set BITMOD_LOG to control log output.",
    help_template = r"
{name} {version} - {about}

USAGE:
    {usage}

OPTIONS:
    {all-args}
",
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(
        name = "init",
        about = "Initialize a new repository",
        long_about = "This command initializes a new repository in the current directory or at the specified path."
    )]
    Init {
        #[arg(index = 1, help = "The path to the repository")]
        path: Option<PathBuf>,
    },
    #[command(name = "cat-file", about = "Print the content of an object")]
    CatFile {
        #[arg(short = 'p', long, help = "The object (id or revision) to print")]
        object: String,
    },
    #[command(
        name = "hash-object",
        about = "Hash a file and optionally write it to the object database"
    )]
    HashObject {
        #[arg(short, long, help = "Write the object to the object database")]
        write: bool,
        #[arg(index = 1)]
        file: PathBuf,
    },
    #[command(name = "ls-tree", about = "List the entries of a tree")]
    LsTree {
        #[arg(short, long, help = "Recurse into subtrees")]
        recursive: bool,
        #[arg(index = 1, default_value = "HEAD")]
        tree_ish: String,
    },
    #[command(name = "write-tree", about = "Store the index as a tree and print its id")]
    WriteTree,
    #[command(name = "add", about = "Stage files, directories or submodules")]
    Add {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    #[command(name = "rm", about = "Remove paths from the index and the working tree")]
    Rm {
        #[arg(long, help = "Only remove from the index")]
        cached: bool,
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    #[command(name = "commit", about = "Record the index as a new commit")]
    Commit {
        #[arg(short, long, help = "The commit message")]
        message: String,
    },
    #[command(
        name = "diff",
        about = "Show changed paths",
        long_about = "Without revisions, compares the index with the working tree. \
        With --cached, compares HEAD (or the given revision) with the index. \
        With two revisions, compares their trees."
    )]
    Diff {
        #[arg(long, help = "Compare against the index instead of the working tree")]
        cached: bool,
        #[arg(
            long = "diff-filter",
            value_parser = parse_diff_filter,
            help = "Only show these change types (any of ADMRTU)"
        )]
        filter: Option<DiffFilter>,
        #[arg(num_args = 0..=2)]
        revisions: Vec<String>,
    },
    #[command(name = "checkout", about = "Switch the working tree to a branch or commit")]
    Checkout {
        #[arg(short, long, help = "Discard local changes in the way")]
        force: bool,
        #[arg(short = 'b', long = "branch", help = "Create a branch at the target and switch to it")]
        new_branch: Option<String>,
        #[arg(index = 1)]
        revision: String,
    },
    #[command(name = "merge", about = "Merge a revision into the current branch")]
    Merge {
        #[arg(short, long, help = "Message for the merge commit")]
        message: Option<String>,
        #[arg(index = 1)]
        revision: String,
    },
    #[command(name = "resolve", about = "Resolve a conflicted path with one of its versions")]
    Resolve {
        #[arg(index = 1)]
        path: PathBuf,
        #[arg(long, value_enum)]
        side: Side,
    },
    #[command(name = "submodule", about = "Manage nested repositories")]
    Submodule {
        #[command(subcommand)]
        command: SubmoduleCommands,
    },
}

#[derive(Subcommand)]
enum SubmoduleCommands {
    #[command(name = "update", about = "Check out the commits HEAD records for each submodule")]
    Update {
        #[arg(long, help = "Also update nested submodules")]
        recursive: bool,
        #[arg(long, help = "Follow the configured branch instead of the recorded commit")]
        remote: bool,
        #[arg(long, help = "Only report what would be done")]
        dry_run: bool,
        #[arg(short, long, help = "Discard local changes in submodules")]
        force: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Side {
    Base,
    Ours,
    Theirs,
}

impl From<Side> for ConflictSide {
    fn from(side: Side) -> Self {
        match side {
            Side::Base => ConflictSide::Base,
            Side::Ours => ConflictSide::Ours,
            Side::Theirs => ConflictSide::Theirs,
        }
    }
}

fn parse_diff_filter(letters: &str) -> Result<DiffFilter, String> {
    DiffFilter::try_parse(letters).ok_or_else(|| format!("unknown change type in '{letters}'"))
}

fn open_repository(path: &Path) -> Result<Repository> {
    Repository::open(path, Settings::load_from_env()?, Box::new(std::io::stdout()))
}

fn current_repository() -> Result<Repository> {
    open_repository(&std::env::current_dir()?)
}

fn resolve(repository: &Repository, revision: &str) -> Result<ObjectId> {
    repository.refs().resolve_name(revision, repository.database())
}

fn diff_endpoints(
    repository: &Repository,
    cached: bool,
    revisions: &[String],
) -> Result<(Option<DiffEndpoint>, Option<DiffEndpoint>)> {
    let tree = |revision: &str| resolve(repository, revision).map(DiffEndpoint::Tree);

    match (revisions, cached) {
        ([], false) => Ok((Some(DiffEndpoint::Index), None)),
        ([], true) => Ok((Some(tree("HEAD")?), Some(DiffEndpoint::Index))),
        ([old], false) => Ok((Some(tree(old)?), None)),
        ([old], true) => Ok((Some(tree(old)?), Some(DiffEndpoint::Index))),
        ([old, new], _) => Ok((Some(tree(old)?), Some(tree(new)?))),
        _ => anyhow::bail!("diff takes at most two revisions"),
    }
}

fn run(command: Commands) -> Result<ExitCode> {
    match command {
        Commands::Init { path } => {
            let path = match path {
                Some(path) => path,
                None => std::env::current_dir()?,
            };
            open_repository(&path)?.init()?;
        }
        Commands::CatFile { object } => current_repository()?.cat_file(&object)?,
        Commands::HashObject { write, file } => current_repository()?.hash_object(&file, write)?,
        Commands::LsTree { recursive, tree_ish } => {
            current_repository()?.ls_tree(&tree_ish, recursive)?
        }
        Commands::WriteTree => {
            let repository = current_repository()?;
            let oid = repository.write_tree()?;
            writeln!(repository.writer(), "{oid}")?;
        }
        Commands::Add { paths } => current_repository()?.add(&paths)?,
        Commands::Rm { cached, paths } => current_repository()?.remove(&paths, !cached)?,
        Commands::Commit { message } => {
            current_repository()?.commit(&message, None)?;
        }
        Commands::Diff {
            cached,
            filter,
            revisions,
        } => {
            let repository = current_repository()?;
            let (old, new) = diff_endpoints(&repository, cached, &revisions)?;
            let filter = filter.unwrap_or(DiffFilter::all());
            for record in repository
                .diff(old, new)?
                .into_iter()
                .filter(|record| record.change_type.matches_filter(filter))
            {
                writeln!(repository.writer(), "{}", record.name_status())?;
            }
        }
        Commands::Checkout {
            force,
            new_branch,
            revision,
        } => {
            let repository = current_repository()?;
            let target = resolve(&repository, &revision)?;
            let existing_branch = repository
                .refs()
                .read_ref(&format!("refs/heads/{revision}"))?
                .map(|_| revision.clone());
            let branch = new_branch.or(existing_branch);

            repository.checkout(&target, branch.as_deref(), force)?;
        }
        Commands::Merge { message, revision } => {
            let repository = current_repository()?;
            let message = message.unwrap_or_else(|| format!("Merge {revision}"));
            if let MergeOutcome::Conflicted { .. } = repository.merge(&revision, &message)? {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Resolve { path, side } => current_repository()?.resolve(&path, side.into())?,
        Commands::Submodule {
            command:
                SubmoduleCommands::Update {
                    recursive,
                    remote,
                    dry_run,
                    force,
                },
        } => {
            let options = UpdateOptions {
                recursive,
                to_latest_revision: remote,
                dry_run,
                force,
                ..Default::default()
            };
            let report = current_repository()?.submodule_update(&options)?;
            if report.failures().next().is_some() {
                return Ok(ExitCode::FAILURE);
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli.command) {
        Ok(code) => code,
        Err(error) => {
            eprintln!("fatal: {error:#}");
            ExitCode::from(128)
        }
    }
}
