fn main() -> anyhow::Result<()> {
    beacon::cli::run_cli()
}
