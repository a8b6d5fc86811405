use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = aisle_repl::Args::parse();

	aisle_repl::run(args).await
}
