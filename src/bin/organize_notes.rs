use clap::Parser;
use notetidy::cli::{OrganizeArgs, init_tracing, run_organize};
use std::process::ExitCode;

fn main() -> ExitCode {
    let args = OrganizeArgs::parse();
    init_tracing(args.verbose);
    run_organize(&args).into()
}
