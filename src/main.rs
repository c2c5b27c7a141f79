use std::process;

use clap::Parser;

use madx2bmad::{bmad_file_name, Options, Translator};

#[derive(Parser)]
#[command(
    name = "madx2bmad",
    version,
    about = "Translate a MADX lattice file to Bmad format"
)]
struct Cli {
    /// Input MADX lattice file
    madx_file: String,
    /// Print token dumps for each command (not of general interest)
    #[arg(short, long)]
    debug: bool,
    /// Create one Bmad file per MADX input file
    #[arg(short = 'f', long = "many_files")]
    many_files: bool,
    /// Superimpose elements in a sequence instead of flattening to a line
    #[arg(short, long)]
    superimpose: bool,
    /// Do not move variable assignments to the beginning of the Bmad file
    #[arg(short = 'v', long = "no_prepend_vars")]
    no_prepend_vars: bool,
}

fn main() {
    let cli = Cli::parse();
    let opts = Options {
        debug: cli.debug,
        prepend_vars: !cli.no_prepend_vars,
        superimpose: cli.superimpose,
        one_file: !cli.many_files,
    };

    println!("Input lattice file is:  {}", cli.madx_file);
    println!("Output lattice file is: {}", bmad_file_name(&cli.madx_file));

    let mut translator = match Translator::from_file(&cli.madx_file, opts) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("error: cannot open '{}': {}", cli.madx_file, e);
            process::exit(1);
        }
    };

    translator.run();

    for (name, contents) in translator.finish() {
        if let Err(e) = std::fs::write(&name, contents) {
            eprintln!("error: cannot write '{}': {}", name, e);
            process::exit(1);
        }
    }
}
