use std::path::Path;

use supports_color::Stream;

use crate::core::credentials::{CredentialStore, Credentials, DEPLOYER_ADDRESS, ETH_RPC_URL, PRIVATE_KEY};
use crate::core::scripts::{ScriptEntry, SCRIPT_EXTENSIONS};

pub struct Printer {
    pub use_color: bool,
}

impl Printer {
    pub fn new() -> Self {
        let use_color = supports_color::on(Stream::Stdout).is_some();
        Self { use_color }
    }

    pub fn success(&self, message: &str) {
        self.print_prefix("[+]", "green", message);
    }

    pub fn error(&self, message: &str) {
        self.print_prefix("[-]", "red", message);
    }

    pub fn warning(&self, message: &str) {
        self.print_prefix("[!]", "yellow", message);
    }

    pub fn info(&self, message: &str) {
        self.print_prefix("[?]", "cyan", message);
    }

    pub fn header(&self, title: &str) {
        if self.use_color {
            println!("\n\x1b[1;36m{}\x1b[0m", title); // Bold cyan
            println!("\x1b[90m{}\x1b[0m", "─".repeat(title.chars().count()));
        } else {
            println!("\n{}", title);
            println!("{}", "─".repeat(title.chars().count()));
        }
    }

    pub fn print_prefix(&self, prefix: &str, color: &str, message: &str) {
        if self.use_color {
            let color_code = match color {
                "green" => "\x1b[32m",
                "red" => "\x1b[31m",
                "yellow" => "\x1b[33m",
                "cyan" => "\x1b[36m",
                _ => "\x1b[0m",
            };
            println!("{}{}\x1b[0m {}", color_code, prefix, message);
        } else {
            println!("{} {}", prefix, message);
        }
    }

    pub fn print_key_value(&self, key: &str, value: &str, indent: usize) {
        let indent_str = " ".repeat(indent);
        if self.use_color {
            println!("{}\x1b[1;33m{}\x1b[0m  \x1b[32m{}\x1b[0m", indent_str, key, value);
        } else {
            println!("{}{}  {}", indent_str, key, value);
        }
    }

    pub fn separator(&self) {
        if self.use_color {
            println!("\x1b[90m{}\x1b[0m", "─".repeat(50));
        } else {
            println!("{}", "─".repeat(50));
        }
    }

    pub fn dim(&self, message: &str) {
        if self.use_color {
            println!("\x1b[2m{}\x1b[0m", message);
        } else {
            println!("{}", message);
        }
    }
}

impl Default for Printer {
    fn default() -> Self {
        Self::new()
    }
}

/// Shorten a key to `0xac0974be...f4f2ff80` for display.
pub fn truncate_key(key: &str) -> String {
    if key.len() <= 18 || !key.is_ascii() {
        return key.to_string();
    }
    format!("{}...{}", &key[..10], &key[key.len() - 8..])
}

pub fn show_banner(printer: &Printer) {
    if printer.use_color {
        println!("\x1b[1;36m");
    }

    println!(r"
   ██████╗██████╗ ██╗   ██╗██████╗ ██████╗  ██████╗
  ██╔════╝██╔══██╗╚██╗ ██╔╝██╔══██╗██╔══██╗██╔═══██╗
  ██║     ██████╔╝ ╚████╔╝ ██████╔╝██████╔╝██║   ██║
  ██║     ██╔══██╗  ╚██╔╝  ██╔══██╗██╔══██╗██║   ██║
  ╚██████╗██║  ██║   ██║   ██████╔╝██║  ██║╚██████╔╝
   ╚═════╝╚═╝  ╚═╝   ╚═╝   ╚═════╝ ╚═╝  ╚═╝ ╚═════╝
    ");

    if printer.use_color {
        println!("\x1b[0m");
    }
}

pub fn show_env(printer: &Printer, credentials: &Credentials) {
    printer.header("Environment Variables");
    printer.print_key_value(&format!("{:16}", PRIVATE_KEY), &truncate_key(&credentials.private_key), 2);
    printer.print_key_value(&format!("{:16}", DEPLOYER_ADDRESS), &credentials.address, 2);
    printer.print_key_value(&format!("{:16}", ETH_RPC_URL), &credentials.rpc_url, 2);
}

/// Canonical entries plus anything added with `env add`.
pub fn show_store(printer: &Printer, store: &CredentialStore) {
    if store.is_empty() {
        printer.info("No variables set.");
        return;
    }

    match store.canonical() {
        Some(credentials) => show_env(printer, &credentials),
        None => printer.info("No node credentials captured yet."),
    }

    let mut extra: Vec<(&str, &str)> = store
        .iter()
        .filter(|(name, _)| ![PRIVATE_KEY, DEPLOYER_ADDRESS, ETH_RPC_URL].contains(name))
        .collect();
    if extra.is_empty() {
        return;
    }
    extra.sort();

    let width = extra.iter().map(|(name, _)| name.len()).max().unwrap_or(0).min(24);
    printer.header(&format!("Added ({} variables)", extra.len()));
    for (name, value) in extra {
        printer.print_key_value(&format!("{:width$}", name, width = width), value, 2);
    }
}

pub fn show_scripts(printer: &Printer, scripts: &[ScriptEntry], cwd: &Path) {
    if scripts.is_empty() {
        printer.warning("No scripts found in current directory or subdirectories.");
        let looking_for: Vec<String> = SCRIPT_EXTENSIONS.iter().map(|e| format!(".{}", e)).collect();
        printer.dim(&format!("Looking for: {}", looking_for.join(", ")));
        return;
    }

    let rows: Vec<(String, String, String, String)> = scripts
        .iter()
        .enumerate()
        .map(|(i, script)| {
            (
                (i + 1).to_string(),
                script.relative_to(cwd).display().to_string(),
                format!(".{}", script.extension),
                script.display_size(),
            )
        })
        .collect();

    let name_width = rows
        .iter()
        .map(|(_, name, _, _)| name.chars().count())
        .max()
        .unwrap_or(0)
        .max("Script".len());

    printer.header("Available Scripts");
    println!("  {:>4}  {:name_width$}  {:5}  {}", "#", "Script", "Type", "Size", name_width = name_width);
    for (index, name, ext, size) in rows {
        if printer.use_color {
            println!(
                "  \x1b[2m{:>4}\x1b[0m  \x1b[32m{:name_width$}\x1b[0m  \x1b[33m{:5}\x1b[0m  \x1b[2m{}\x1b[0m",
                index,
                name,
                ext,
                size,
                name_width = name_width
            );
        } else {
            println!("  {:>4}  {:name_width$}  {:5}  {}", index, name, ext, size, name_width = name_width);
        }
    }
}

pub fn show_help(printer: &Printer) {
    printer.header("Commands");
    println!("  list or ls         - List available scripts");
    println!("  run <script>       - Run a script (number, name, or path)");
    println!("  env                - Show environment variables");
    println!("  env add NAME=VAL   - Add an environment variable");
    println!("  help               - Show this help");
    println!("  exit or quit       - Stop Anvil and exit");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_key() {
        let key = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
        assert_eq!(truncate_key(key), "0xac0974be...f4f2ff80");
    }

    #[test]
    fn test_truncate_short_value_untouched() {
        assert_eq!(truncate_key("0x1234"), "0x1234");
    }
}
