use anyhow::Result;

fn main() -> Result<()> {
    let code = ccbox::cli::run()?;
    std::process::exit(code);
}
