use clap::{Parser, Subcommand, ValueEnum};
use gallery_core::sort::{SortContext, SortDirection, SortState, SortType};
use gallery_core::{content_uid, scan_folder, Gallery, GalleryConfig, Result};
use log::{info, warn};
use std::cell::Cell;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

/// Image extensions the thumbnail command picks up
const IMAGE_EXTENSIONS: [&str; 8] = ["png", "jpg", "jpeg", "bmp", "gif", "tga", "tiff", "webp"];

#[derive(Parser, Debug)]
#[command(name = "gallery", version, about = "Headless content gallery tools")]
struct Cli {
    /// Keep index files and thumbnails under this directory
    #[arg(long, global = true, value_name = "DIR")]
    root: Option<PathBuf>,
    /// JSON config file
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List a folder in the stored "Files" sort order
    List {
        folder: PathBuf,
        /// Change (and remember) the sort type
        #[arg(long, value_enum)]
        sort: Option<SortArg>,
        /// Sort descending instead of the type's default direction
        #[arg(long, requires = "sort")]
        desc: bool,
        /// Only list these extensions (comma separated)
        #[arg(short, long, value_delimiter = ',')]
        ext: Vec<String>,
        /// Descend into subfolders
        #[arg(short, long)]
        recursive: bool,
    },
    /// Rate a file from 0 (clear) to 5 stars
    Rate {
        file: PathBuf,
        #[arg(value_parser = clap::value_parser!(i64).range(0..=5))]
        rating: i64,
    },
    /// Toggle a tag on a file
    Tag { file: PathBuf, tag: String },
    /// Show every tag with its usage count
    Tags,
    /// Generate thumbnails for every image in a folder
    Thumbs {
        folder: PathBuf,
        /// Give up after this many seconds
        #[arg(long, default_value_t = 120)]
        timeout: u64,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum SortArg {
    Name,
    Date,
    Size,
    Rating,
}

impl From<SortArg> for SortType {
    fn from(arg: SortArg) -> Self {
        match arg {
            SortArg::Name => SortType::Name,
            SortArg::Date => SortType::Date,
            SortArg::Size => SortType::Size,
            SortArg::Rating => SortType::Rating,
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => GalleryConfig::load(path),
        None => GalleryConfig::default(),
    };
    if let Some(root) = &cli.root {
        let rooted = GalleryConfig::with_root(root);
        config.data_dir = rooted.data_dir;
        config.cache_dir = rooted.cache_dir;
    }

    let mut gallery = Gallery::open(config)?;

    match cli.command {
        Command::List {
            folder,
            sort,
            desc,
            ext,
            recursive,
        } => {
            if let Some(sort) = sort {
                let sort_type = SortType::from(sort);
                let direction = if desc {
                    SortDirection::Descending
                } else {
                    sort_type.default_direction()
                };
                gallery
                    .sort_states_mut()
                    .set(&SortContext::Files, SortState::new(sort_type, direction));
            }

            let extensions: Vec<&str> = ext.iter().map(String::as_str).collect();
            let mut entries = scan_folder(&folder, &extensions, recursive);
            let state = gallery.sort_files(&mut entries);
            println!("{} entries, {} {:?}", entries.len(), state.sort_type, state.direction);

            for entry in &entries {
                let uid = entry.uid();
                println!(
                    "{:<40} {:>10} {}  {}  {}",
                    entry.display_name,
                    entry.size,
                    entry.modified.format("%Y-%m-%d %H:%M"),
                    stars(gallery.ratings().rating(&uid)),
                    gallery.tags().tags(&uid).join(", ")
                );
            }
        }
        Command::Rate { file, rating } => {
            gallery.ratings_mut().set_rating(&content_uid(&file), rating);
            println!("{} {}", stars(rating as u8), file.display());
        }
        Command::Tag { file, tag } => {
            let has = gallery.tags_mut().toggle_tag(&content_uid(&file), &tag);
            let verb = if has { "Tagged" } else { "Untagged" };
            println!("{} {} '{}'", verb, file.display(), tag);
        }
        Command::Tags => {
            for tag in gallery.sorted_tags() {
                println!("{:<30} {}", tag.name, tag.count);
            }
        }
        Command::Thumbs { folder, timeout } => {
            let entries = scan_folder(&folder, &IMAGE_EXTENSIONS, true);
            let produced = Rc::new(Cell::new(0usize));
            gallery.begin_view();

            for (i, entry) in entries.iter().enumerate() {
                let produced = Rc::clone(&produced);
                let priority = i32::try_from(i).unwrap_or(i32::MAX);
                gallery.request_thumbnail(&entry.path, priority, move |_| {
                    produced.set(produced.get() + 1)
                });
            }

            if !gallery
                .thumbnails_mut()
                .wait_idle(Duration::from_secs(timeout))
            {
                warn!("Timed out with {} thumbnails pending", gallery.thumbnails().pending_count());
            }
            info!("Thumbnails cached in {}", gallery.config().cache_dir.display());
            println!("{} of {} thumbnails produced", produced.get(), entries.len());
        }
    }

    gallery.flush();
    Ok(())
}

fn stars(rating: u8) -> String {
    let filled = usize::from(rating.min(5));
    format!("{}{}", "*".repeat(filled), ".".repeat(5 - filled))
}
