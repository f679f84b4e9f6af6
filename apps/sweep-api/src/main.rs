use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = sweep_api::Args::parse();

	sweep_api::run(args).await
}
