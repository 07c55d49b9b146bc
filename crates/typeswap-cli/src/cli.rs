use clap::{Parser, Subcommand};
use std::env;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    author = "bahdotsh",
    version = env!("CARGO_PKG_VERSION"),
    about = "typeswap - expands typed shortcuts in place",
    long_about = "typeswap watches what you type and replaces registered shortcuts \
                  with their expansion in whatever application has focus."
)]
pub struct Typeswap {
    /// Log debug output
    #[clap(long, short, global = true)]
    pub verbose: bool,

    #[clap(subcommand)]
    pub commands: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Add a new shortcut
    Add {
        #[clap(long, short = 's', help = "Keyword to type")]
        shortcut: String,

        #[clap(long, short = 'c', help = "Text it expands to")]
        replacement: String,
    },
    /// Update an existing shortcut
    Update {
        #[clap(long, short = 's', help = "Keyword of the shortcut to update")]
        shortcut: String,

        #[clap(long, short = 'c', help = "New expansion text")]
        replacement: String,
    },
    /// Delete a shortcut
    Delete {
        #[clap(long, short, help = "Keyword of the shortcut to delete")]
        shortcut: String,
    },
    /// List all shortcuts
    List,
    /// Manage services with rotating credentials
    #[clap(subcommand)]
    Service(ServiceCommands),
    /// Manage the credentials of a service
    #[clap(subcommand)]
    Credential(CredentialCommands),
    /// Run the expansion engine in the foreground until Ctrl-C
    Run,
    /// Print the effective configuration
    Config,
}

#[derive(Subcommand)]
pub enum ServiceCommands {
    /// Register a service
    Add {
        #[clap(long, help = "Short unique code, e.g. netflix")]
        code: String,

        #[clap(long, help = "Display name")]
        name: String,

        #[clap(long, short = 's', help = "Keyword that expands to the next credential, e.g. @nf")]
        shortcut: String,
    },
    /// List services
    List,
}

#[derive(Subcommand)]
pub enum CredentialCommands {
    /// Add one credential to a service
    Add {
        #[clap(long, help = "Service code")]
        service: String,

        #[clap(long, short = 'c', help = "Credential text")]
        content: String,
    },
    /// Import credentials from a file, one per line
    Import {
        #[clap(long, help = "Service code")]
        service: String,

        #[clap(long, short, help = "File to read")]
        file: PathBuf,
    },
    /// List the credentials of a service
    List {
        #[clap(long, help = "Service code")]
        service: String,
    },
    /// Print the next credential for a keyword and mark it used
    Next {
        #[clap(long, short = 's', help = "Service keyword, e.g. @nf")]
        shortcut: String,
    },
    /// Clear usage marks so rotation starts over
    Reset {
        #[clap(long, help = "Service code; all services when omitted")]
        service: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_credential_command() {
        let args = Typeswap::try_parse_from([
            "typeswap",
            "credential",
            "import",
            "--service",
            "netflix",
            "--file",
            "accounts.txt",
        ])
        .unwrap();
        match args.commands {
            Commands::Credential(CredentialCommands::Import { service, file }) => {
                assert_eq!(service, "netflix");
                assert_eq!(file, PathBuf::from("accounts.txt"));
            }
            _ => panic!("wrong command"),
        }
    }

    #[test]
    fn verbose_is_global() {
        let args = Typeswap::try_parse_from(["typeswap", "list", "-v"]).unwrap();
        assert!(args.verbose);
    }
}
