use clap::Parser;
use notetidy::cli::{Md2PdfArgs, init_tracing, run_md2pdf};
use std::process::ExitCode;

fn main() -> ExitCode {
    let args = Md2PdfArgs::parse();
    init_tracing(args.verbose);
    run_md2pdf(&args).into()
}
