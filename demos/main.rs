use assembly_images::{get_image_base64_by_resource, get_image_by_resource, get_images_by_path};

fn main() {
    let _ = std::fs::create_dir("output");

    let path = "C:\\Windows\\Microsoft.NET\\Framework64\\v4.0.30319\\System.Windows.Forms.dll";

    let images = get_images_by_path(path).unwrap();
    for (index, image) in images.iter().enumerate() {
        let (width, height) = image.info.display().dimensions();
        println!("{index:4} {} {width}x{height}", image.info.resource_name());
        image
            .info
            .display()
            .save(format!("output/{index:04}.png"))
            .unwrap();
    }

    let image = get_image_by_resource(path, "System.Windows.Forms.Error.ico").unwrap();
    image.save("output/error.png").unwrap();

    let base64 = get_image_base64_by_resource(path, "System.Windows.Forms.Error.ico").unwrap();
    println!("Error: {}", base64);
}
