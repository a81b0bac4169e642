use std::{
    error::Error,
    path::{Path, PathBuf},
};

use clap::{Parser, Subcommand};

use assembly_images::{ExtractOptions, ImageCatalog, extension_for, find_assemblies, format_failures};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Log every resource as it is decoded.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Preferred size, in pixels, of the icon and cursor entries shown.
    #[arg(long, global = true, default_value_t = 32)]
    icon_size: u32,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Lists the images embedded in every assembly matching the patterns.
    List { patterns: Vec<String> },

    /// Saves one image; the output extension picks the format.
    Save {
        assembly: PathBuf,
        index: usize,
        output: PathBuf,
    },

    /// Saves every image below a folder, grouped by file type.
    SaveAll { assembly: PathBuf, folder: PathBuf },

    /// Prints the properties of one image as JSON.
    Properties { assembly: PathBuf, index: usize },

    /// Copies one image to the clipboard.
    Copy { assembly: PathBuf, index: usize },

    /// Prints one image as base64 encoded PNG.
    Base64 { assembly: PathBuf, index: usize },
}

fn open(path: &Path, options: ExtractOptions) -> Result<ImageCatalog, Box<dyn Error>> {
    let mut catalog = ImageCatalog::with_options(options);
    catalog.open(path)?;
    Ok(catalog)
}

fn list(patterns: &[String], options: ExtractOptions) -> Result<(), Box<dyn Error>> {
    for pattern in patterns {
        for path in find_assemblies(pattern)? {
            let mut catalog = ImageCatalog::with_options(options);
            if let Err(e) = catalog.open(&path) {
                log::warn!("{}: {e}", path.display());
                continue;
            }
            println!("{}", catalog.full_name().unwrap_or_default());
            if let Some(info) = catalog.info().filter(|info| !info.title.is_empty()) {
                println!("  {} {}", info.title, info.copyright);
            }
            for (index, image) in catalog.images().iter().enumerate() {
                let (width, height) = image.info.display().dimensions();
                println!(
                    "{index:4}  {:<6} {width}x{height}{}  {}{}",
                    format!("{:?}", image.info.image_type()),
                    if image.animated { " (animated)" } else { "" },
                    image.info.resource_name(),
                    extension_for(&image.info),
                );
            }
        }
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    let default_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();

    let options = ExtractOptions::new().with_icon_size(args.icon_size);
    match &args.command {
        Command::List { patterns } => list(patterns, options)?,
        Command::Save {
            assembly,
            index,
            output,
        } => open(assembly, options)?.save(*index, output)?,
        Command::SaveAll { assembly, folder } => {
            let failures = open(assembly, options)?.save_all(folder)?;
            if !failures.is_empty() {
                log::warn!("Unable to save the following items:\n{}", format_failures(&failures));
            }
        }
        Command::Properties { assembly, index } => {
            let details = open(assembly, options)?.properties(*index)?;
            println!("{}", serde_json::to_string_pretty(&details)?);
        }
        Command::Copy { assembly, index } => open(assembly, options)?.copy(*index)?,
        Command::Base64 { assembly, index } => println!("{}", open(assembly, options)?.base64(*index)?),
    }
    Ok(())
}
