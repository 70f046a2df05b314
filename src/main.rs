use anyhow::{Context, Result, bail};
use clap::{Arg, ArgAction, ArgMatches, Command};
use dialoguer::Confirm;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use garage_board::climb::IMAGES_FOLDER;
use garage_board::compositor;
use garage_board::config::{Config, DEFAULT_CONFIG_PATH, Mode};
use garage_board::editor::{BoardRect, Editor};
use garage_board::export;
use garage_board::session::{self, Session};
use garage_board::store::{Collection, SetterCollection, export_pretty};

fn cli() -> Command {
    let id = || Arg::new("id").value_name("ID").required(true).help("Climb id");

    Command::new("garage-board")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Mark holds on a board photo, keep a collection of climbs, and export it for publishing")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("PATH")
                .global(true)
                .value_parser(clap::value_parser!(PathBuf))
                .help("Config file (default board_config.json, or $BOARD_CONFIG)"),
        )
        .arg(
            Arg::new("host")
                .long("host")
                .value_name("URL")
                .global(true)
                .help("Host the board runs on; localhost, 127.0.0.1 or file: means setter mode (or $BOARD_HOST)"),
        )
        .arg(
            Arg::new("board")
                .long("board")
                .value_name("IMAGE")
                .global(true)
                .value_parser(clap::value_parser!(PathBuf))
                .help("Board photo to composite marks onto"),
        )
        .subcommand(Command::new("list").about("List climbs, newest first"))
        .subcommand(Command::new("show").about("Print one climb").arg(id()))
        .subcommand(
            Command::new("edit")
                .about("Annotate a new climb, or edit an existing one")
                .arg(Arg::new("id").value_name("ID").help("Climb to edit (omit for a new climb)")),
        )
        .subcommand(
            Command::new("render")
                .about("Composite a climb onto the board photo as PNG")
                .arg(id())
                .arg(
                    Arg::new("out")
                        .long("out")
                        .short('o')
                        .value_name("PATH")
                        .value_parser(clap::value_parser!(PathBuf))
                        .help("Output file (default climb-images/<id>.png)"),
                )
                .arg(
                    Arg::new("data-url")
                        .long("data-url")
                        .action(ArgAction::SetTrue)
                        .help("Print a data: URL instead of writing a file"),
                ),
        )
        .subcommand(Command::new("delete").about("Delete a climb").arg(id()))
        .subcommand(
            Command::new("clear").about("Delete every climb on this device").arg(
                Arg::new("yes")
                    .long("yes")
                    .short('y')
                    .action(ArgAction::SetTrue)
                    .help("Skip the confirmation prompt"),
            ),
        )
        .subcommand(
            Command::new("export")
                .about("Print climbs.json, or write a publish bundle with images")
                .arg(
                    Arg::new("out")
                        .long("out")
                        .short('o')
                        .value_name("DIR")
                        .value_parser(clap::value_parser!(PathBuf))
                        .help("Bundle directory (climbs.json + climb-images/)"),
                ),
        )
        .subcommand(Command::new("init-config").about("Write the effective configuration file"))
}

fn load_config(matches: &ArgMatches) -> Result<(Config, PathBuf)> {
    let path = matches
        .get_one::<PathBuf>("config")
        .cloned()
        .or_else(|| env::var_os("BOARD_CONFIG").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    let mut config = Config::load(&path)?;

    if let Some(host) = matches
        .get_one::<String>("host")
        .cloned()
        .or_else(|| env::var("BOARD_HOST").ok())
    {
        config.host = host;
    }
    if let Some(board) = matches.get_one::<PathBuf>("board") {
        config.board_image = board.clone();
    }
    Ok((config, path))
}

/// Boots the local collection, refusing before any I/O in viewer mode.
async fn boot_setter(config: &Config, mode: Mode, command: &str) -> Result<SetterCollection> {
    if !mode.is_setter() {
        bail!("'{}' is only available in setter mode", command);
    }
    match Collection::boot(config, mode).await {
        Collection::Setter(collection) => Ok(collection),
        Collection::Viewer(_) => bail!("'{}' is only available in setter mode", command),
    }
}

fn board_rect(path: &Path) -> BoardRect {
    match image::image_dimensions(path) {
        Ok((width, height)) => BoardRect::from_size(width, height),
        Err(e) => {
            log::warn!(
                "Cannot read board image {} ({}); 'tap' takes normalized coordinates",
                path.display(),
                e
            );
            BoardRect::UNIT
        }
    }
}

fn print_list(collection: &Collection) {
    let climbs = collection.newest_first();
    if climbs.is_empty() {
        match collection.mode() {
            Mode::Setter => println!("No climbs yet. Run `garage-board edit` to add your first one."),
            Mode::Viewer => println!("No climbs found. Make sure climbs.json is published in the site root."),
        }
        return;
    }
    for climb in climbs {
        let or_dash = |s: &str| if s.is_empty() { "—".to_string() } else { s.to_string() };
        println!(
            "{}  [{}]",
            if climb.name.is_empty() { "Unnamed" } else { climb.name.as_str() },
            or_dash(&climb.grade)
        );
        println!(
            "  First ascent: {} • Marks: {} • id: {}",
            or_dash(&climb.first_ascent),
            climb.count_marks(),
            climb.id
        );
        if !climb.image.trim().is_empty() {
            println!("  Image: {}", climb.image);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let matches = cli().get_matches();
    let (config, config_path) = load_config(&matches)?;
    let mode = config.resolve_mode();
    log::info!("Garage board running in {} mode", mode);

    match matches.subcommand() {
        Some(("list", _)) => {
            let collection = Collection::boot(&config, mode).await;
            print_list(&collection);
        }
        Some(("show", args)) => {
            let id = args.get_one::<String>("id").map(String::as_str).unwrap_or_default();
            let collection = Collection::boot(&config, mode).await;
            let climb = collection
                .find(id)
                .with_context(|| format!("No climb with id '{}'", id))?;
            let mut editor = Editor::new(mode);
            editor.load_into_draft(climb, true);
            println!("{}", serde_json::to_string_pretty(editor.draft())?);
        }
        Some(("edit", args)) => {
            let mut collection = boot_setter(&config, mode, "edit").await?;
            let mut editor = Editor::new(mode);
            if let Some(id) = args.get_one::<String>("id") {
                let climb = collection
                    .climbs()
                    .iter()
                    .find(|c| &c.id == id)
                    .cloned()
                    .with_context(|| format!("No climb with id '{}'", id))?;
                editor.load_into_draft(&climb, false);
            }
            let session = Session::new(editor, board_rect(&config.board_image));
            session::run(session, &mut collection)?;
        }
        Some(("render", args)) => {
            let collection = boot_setter(&config, mode, "render").await?;
            let id = args.get_one::<String>("id").map(String::as_str).unwrap_or_default();
            let climb = collection
                .climbs()
                .iter()
                .find(|c| c.id == id)
                .with_context(|| format!("No climb with id '{}'", id))?;
            let mut editor = Editor::new(mode);
            editor.load_into_draft(climb, true);

            let reference = compositor::load_reference(&config.board_image)?;
            let png = compositor::render(&reference, editor.draft())
                .context("Failed to composite climb image")?;

            if args.get_flag("data-url") {
                println!("{}", compositor::to_data_url(&png));
            } else {
                let out = match args.get_one::<PathBuf>("out") {
                    Some(out) => out.clone(),
                    None => {
                        let file_name = export::image_file_name(id)
                            .with_context(|| format!("Climb id '{}' is not a safe file name; pass --out", id))?;
                        Path::new(IMAGES_FOLDER).join(file_name)
                    }
                };
                if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
                    fs::create_dir_all(parent)
                        .with_context(|| format!("Failed to create {}", parent.display()))?;
                }
                fs::write(&out, png).with_context(|| format!("Failed to write {}", out.display()))?;
                println!("Wrote {}", out.display());
            }
        }
        Some(("delete", args)) => {
            let mut collection = boot_setter(&config, mode, "delete").await?;
            let id = args.get_one::<String>("id").map(String::as_str).unwrap_or_default();
            match collection.delete_climb(id)? {
                0 => println!("No climb with id '{}'", id),
                n => println!("Deleted {} climb(s)", n),
            }
        }
        Some(("clear", args)) => {
            let mut collection = boot_setter(&config, mode, "clear").await?;
            let confirmed = args.get_flag("yes")
                || Confirm::new()
                    .with_prompt("Clear all climbs from this device?")
                    .default(false)
                    .interact()
                    .context("Failed to read confirmation")?;
            if confirmed {
                collection.clear()?;
                println!("Cleared all climbs");
            }
        }
        Some(("export", args)) => {
            let collection = boot_setter(&config, mode, "export").await?;
            match args.get_one::<PathBuf>("out") {
                None => println!("{}", export_pretty(collection.climbs())?),
                Some(out) => {
                    let reference = compositor::load_reference(&config.board_image)?;
                    let summary =
                        export::write_bundle(collection.climbs(), &reference, out, &config.published_path)?;
                    println!(
                        "Exported {} climbs and {} images to {}",
                        summary.climbs,
                        summary.images,
                        out.display()
                    );
                }
            }
        }
        Some(("init-config", _)) => {
            config.save(&config_path)?;
            println!("Wrote {}", config_path.display());
        }
        _ => unreachable!("subcommand_required"),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition() {
        cli().debug_assert();
    }

    #[test]
    fn test_global_overrides() {
        let matches = cli()
            .try_get_matches_from([
                "garage-board",
                "list",
                "--config",
                "/nonexistent/board_config.json",
                "--host",
                "https://someone.github.io/board/",
                "--board",
                "wall.png",
            ])
            .unwrap();
        let (config, path) = load_config(&matches).unwrap();
        assert_eq!(path, PathBuf::from("/nonexistent/board_config.json"));
        assert_eq!(config.resolve_mode(), Mode::Viewer);
        assert_eq!(config.board_image, PathBuf::from("wall.png"));
    }

    #[tokio::test]
    async fn test_viewer_refuses_setter_commands() {
        let err = boot_setter(&Config::default(), Mode::Viewer, "delete").await.unwrap_err();
        assert!(err.to_string().contains("only available in setter mode"));
    }
}
