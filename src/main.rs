fn main() -> anyhow::Result<()> {
    pairtrim::cli::run()
}
