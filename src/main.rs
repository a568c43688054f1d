use clap::Parser;

use originfs::cmd;

#[derive(Debug, Parser)]
#[clap(author, name = "originfs", version, about = "A FUSE filesystem that signs every file version as fixed-size, hierarchically-named segments")]
struct Cli {
    #[clap(flatten)]
    args: cmd::OriginFsArgs,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    cmd::run(cli.args)
}
