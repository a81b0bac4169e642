use assembly_images::{ExtractOptions, ImageCatalog, format_failures};

fn main() {
    // Substitute any assembly with embedded images
    let path = "C:\\Windows\\Microsoft.NET\\Framework64\\v4.0.30319\\System.Design.dll";

    let mut catalog = ImageCatalog::with_options(ExtractOptions::new().with_icon_size(16));
    let count = catalog.open(path).unwrap();
    println!("{}: {count} images", catalog.full_name().unwrap_or_default());
    if let Some(info) = catalog.info() {
        println!("{} / {} / {}", info.title, info.company, info.copyright);
    }

    let details = catalog.properties(0).unwrap();
    println!("{}", serde_json::to_string_pretty(&details).unwrap());

    let failures = catalog.save_all("output/all").unwrap();
    if !failures.is_empty() {
        println!("{}", format_failures(&failures));
    }
}
