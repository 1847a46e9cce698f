// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

fn check_command(name: &'static str, about: &'static str) -> Command {
    Command::new(name)
        .about(about)
        .arg(
            Arg::new("repo")
                .long("repo")
                .value_name("NAME,URL")
                .action(ArgAction::Append)
                .required(true)
                .help("Repository to test against (repeatable)"),
        )
        .arg(
            Arg::new("arch")
                .long("arch")
                .value_name("ARCH")
                .help("Target architecture (guessed from the packages if omitted)"),
        )
        .arg(
            Arg::new("packages")
                .required(true)
                .num_args(1..)
                .help("Package files under test"),
        )
}

fn build_cli() -> Command {
    Command::new("deplint")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Dependency consistency checks for RPM packages")
        .subcommand_required(true)
        .arg(
            Arg::new("debug")
                .long("debug")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Show debug logging on stderr"),
        )
        .subcommand(check_command("check", "Run every check against the repositories"))
        .subcommand(check_command(
            "check-sat",
            "Check that the packages under test have all requirements satisfied",
        ))
        .subcommand(check_command(
            "check-repoclosure",
            "Check that repository packages still resolve with the packages under test",
        ))
        .subcommand(check_command(
            "check-conflicts",
            "Check for undeclared file conflicts",
        ))
        .subcommand(check_command(
            "check-upgrade",
            "Check that no repository package would upgrade the packages under test",
        ))
        .subcommand(check_command(
            "list-deps",
            "List the packages providing each requirement of the packages under test",
        ))
        .subcommand(
            Command::new("completions")
                .about("Generate shell completion scripts")
                .arg(
                    Arg::new("shell")
                        .required(true)
                        .value_parser(["bash", "elvish", "fish", "powershell", "zsh"])
                        .help("Shell type"),
                ),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // Create man directory
    let out_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    let man_dir = out_dir.join("man");
    fs::create_dir_all(&man_dir).expect("Failed to create man directory");

    let man = Man::new(build_cli());
    let mut buffer = Vec::new();
    man.render(&mut buffer).expect("Failed to render man page");

    let man_path = man_dir.join("deplint.1");
    fs::write(&man_path, buffer).expect("Failed to write man page");
}
