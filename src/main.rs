use clap::{
    crate_authors, crate_description, crate_name, crate_version, Arg, ArgAction, ArgMatches,
    Command,
};
use std::path::PathBuf;

use bone::{api, config::DEFAULT_BONEFILE};

// The CLI layer should only parse inputs and forward them to library code.
fn main() -> miette::Result<()> {
    let matches = Command::new(crate_name!())
        .about(crate_description!())
        .author(crate_authors!())
        .version(crate_version!())
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose output")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .arg(
            Arg::new("file")
                .short('f')
                .long("file")
                .help("Bonefile declaring the virtual folders")
                .default_value(DEFAULT_BONEFILE)
                .global(true),
        )
        .subcommand_required(true)
        .subcommand(
            Command::new("build")
                .about("Writes virtual folders to disk")
                .arg(
                    Arg::new("folders")
                        .help("folders to build; all of them when omitted")
                        .num_args(0..)
                        .action(ArgAction::Append),
                ),
        )
        .subcommand(
            Command::new("cat")
                .about("Prints a virtual or real file")
                .arg(Arg::new("path").help("file to print").required(true)),
        )
        .subcommand(
            Command::new("ls")
                .about("Lists a virtual or real directory")
                .arg(Arg::new("path").help("directory to list").required(true)),
        )
        .subcommand(
            Command::new("search")
                .about("Lists paths matching a glob pattern")
                .arg(Arg::new("pattern").help("glob pattern").required(true))
                .arg(
                    Arg::new("virtual")
                        .help("only list virtual files")
                        .long("virtual")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("project")
                .about("Lists the files of a project")
                .arg(Arg::new("name").help("project name").required(true)),
        )
        .subcommand(
            Command::new("tree")
                .about("Previews the virtual files of a folder")
                .arg(Arg::new("folder").help("virtual folder").required(true)),
        )
        .get_matches();

    init_logger(matches.get_flag("verbose"));

    let bonefile = matches
        .get_one::<String>("file")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_BONEFILE));
    let bone = api::load(&bonefile)?;

    match matches.subcommand() {
        Some(("build", args)) => {
            let folders: Vec<String> = args
                .get_many::<String>("folders")
                .map(|values| values.cloned().collect())
                .unwrap_or_default();
            api::build(&bone, &folders)?;
        }
        Some(("cat", args)) => api::cat(&bone, required(args, "path"))?,
        Some(("ls", args)) => api::ls(&bone, required(args, "path"))?,
        Some(("search", args)) => {
            api::search(&bone, required(args, "pattern"), args.get_flag("virtual"))?
        }
        Some(("project", args)) => api::project(&bone, required(args, "name"))?,
        Some(("tree", args)) => api::tree(&bone, required(args, "folder"))?,
        _ => unreachable!(),
    }

    Ok(())
}

/// `RUST_LOG` refines the `warn` default; `--verbose` raises everything to `debug`.
fn init_logger(is_verbose: bool) {
    let mut builder = env_logger::Builder::new();
    builder
        .filter_level(log::LevelFilter::Warn)
        .parse_default_env();

    if is_verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }

    builder.init();
}

fn required<'a>(args: &'a ArgMatches, name: &str) -> &'a str {
    args.get_one::<String>(name)
        .map(String::as_str)
        .unwrap_or_default()
}
