use std::fs;

fn main() -> anyhow::Result<()> {
    let port = usergate::config::app_port();
    let doc = usergate::docs::build_openapi(port);
    let s = serde_json::to_string_pretty(&doc)?;

    match std::env::args().nth(1) {
        Some(path) => {
            fs::write(&path, s)?;
            println!("wrote {}", path);
        }
        None => println!("{}", s),
    }

    Ok(())
}
