mod app;
mod cli;

fn main() {
    let cli = cli::parse();
    app::init_tracing(cli.verbose);
    app::run(cli);
}
