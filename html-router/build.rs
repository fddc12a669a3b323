fn main() {
    let profile = std::env::var("PROFILE").unwrap_or_else(|_| "debug".to_string());

    // Templates are embedded for release builds only; debug builds read them from disk.
    if profile == "release" {
        minijinja_embed::embed_templates!("templates");
    } else {
        println!("cargo:info=Build: Skipping template embedding for debug build.");
    }
}
