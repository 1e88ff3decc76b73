// SPDX-License-Identifier: Apache-2.0
// Copyright CGNAT Authors

//! Command-line surface (§6). Everything ahead of a literal `--` is a
//! driver-specific initialization prefix handed to the packet I/O fabric verbatim;
//! this crate never interprets it.

use clap::Parser;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Parsed CLI arguments for the cgnat binary.
#[derive(Debug, Parser)]
#[command(name = "cgnat", about = "Carrier-grade NAT data plane")]
pub struct CmdArgs {
    /// Bitmask selecting NIC ports; the first set bit is used.
    #[arg(short = 'p', value_parser = parse_hex_or_decimal)]
    port_mask: u32,

    /// Enable promiscuous mode.
    #[arg(short = 'P', default_value_t = true)]
    promiscuous: bool,

    /// Number of RX/TX queues, and so the number of worker cores.
    #[arg(short = 'q', default_value_t = 1)]
    queues: u32,

    /// Path to the YAML configuration file.
    #[arg(short = 'c', long = "config", default_value = "/etc/cgnat/config.yaml")]
    config_path: PathBuf,

    /// Raise logging verbosity; may be repeated.
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbose: u8,

    /// Log output format.
    #[arg(long = "log-format", value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,

    /// Driver-specific initialization arguments, passed through untouched.
    #[arg(last = true)]
    driver_args: Vec<String>,
}

fn parse_hex_or_decimal(raw: &str) -> Result<u32, std::num::ParseIntError> {
    match raw.strip_prefix("0x") {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => raw.parse(),
    }
}

impl CmdArgs {
    #[must_use]
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// The index of the first set bit in `port_mask`, if any.
    #[must_use]
    pub fn first_port(&self) -> Option<u32> {
        if self.port_mask == 0 {
            None
        } else {
            Some(self.port_mask.trailing_zeros())
        }
    }

    #[must_use]
    pub fn port_mask(&self) -> u32 {
        self.port_mask
    }

    #[must_use]
    pub fn promiscuous(&self) -> bool {
        self.promiscuous
    }

    #[must_use]
    pub fn queues(&self) -> u32 {
        self.queues
    }

    #[must_use]
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    #[must_use]
    pub fn verbose(&self) -> u8 {
        self.verbose
    }

    #[must_use]
    pub fn log_format(&self) -> LogFormat {
        self.log_format
    }

    #[must_use]
    pub fn driver_args(&self) -> &[String] {
        &self.driver_args
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_invocation() {
        let args = CmdArgs::parse_from(["cgnat", "-p", "0x1", "-q", "4"]);
        assert_eq!(args.first_port(), Some(0));
        assert_eq!(args.queues(), 4);
        assert!(args.promiscuous());
        assert_eq!(args.config_path(), Path::new("/etc/cgnat/config.yaml"));
        assert_eq!(args.log_format(), LogFormat::Pretty);
    }

    #[test]
    fn driver_args_captured_after_separator() {
        let args = CmdArgs::parse_from(["cgnat", "-p", "0x4", "--", "--eal-flag", "1"]);
        assert_eq!(args.first_port(), Some(2));
        assert_eq!(args.driver_args(), ["--eal-flag", "1"]);
    }

    #[test]
    fn verbose_flag_counts_repeats() {
        let args = CmdArgs::parse_from(["cgnat", "-p", "0x1", "-v", "-v"]);
        assert_eq!(args.verbose(), 2);
    }

    #[test]
    fn decimal_port_mask_accepted() {
        let args = CmdArgs::parse_from(["cgnat", "-p", "8"]);
        assert_eq!(args.first_port(), Some(3));
    }
}
