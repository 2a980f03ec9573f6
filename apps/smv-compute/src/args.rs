//! Command line parsing.

use std::path::PathBuf;

use anyhow::{bail, Context as _};
use smv_core::Filter;

/// Options of the `filter` subcommand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterOptions {
    /// Image to filter. A procedural checkerboard is used when absent.
    pub input: Option<PathBuf>,
    pub output: PathBuf,
    pub filter: Filter,
    /// SPIR-V file replacing the built-in filter shader.
    pub shader: Option<PathBuf>,
}

impl Default for FilterOptions {
    fn default() -> Self {
        Self {
            input: None,
            output: PathBuf::from("filtered.png"),
            filter: Filter::Grayscale,
            shader: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Double,
    Filter(FilterOptions),
    All(FilterOptions),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputeArgs {
    pub command: Command,
    pub validation: bool,
    pub help: bool,
}

impl ComputeArgs {
    /// Parse `args`, where `args[0]` is the program name.
    pub fn parse(args: &[String]) -> anyhow::Result<Self> {
        let mut rest = args.iter().skip(1).peekable();

        let subcommand = match rest.peek().map(|s| s.as_str()) {
            Some(name @ ("double" | "filter" | "all")) => {
                rest.next();
                name
            }
            _ => "all",
        };

        let mut options = FilterOptions::default();
        let mut validation = cfg!(debug_assertions);
        let mut help = false;

        while let Some(arg) = rest.next() {
            let mut value = || {
                rest.next()
                    .with_context(|| format!("{arg} requires a value"))
            };
            match arg.as_str() {
                "--input" | "-i" => options.input = Some(PathBuf::from(value()?)),
                "--output" | "-o" => options.output = PathBuf::from(value()?),
                "--filter" => options.filter = value()?.parse()?,
                "--shader" => options.shader = Some(PathBuf::from(value()?)),
                "--validation" => validation = true,
                "--no-validation" => validation = false,
                "-h" | "--help" => help = true,
                other => bail!("unknown argument '{other}'"),
            }
        }

        let command = match subcommand {
            "double" => Command::Double,
            "filter" => Command::Filter(options),
            _ => Command::All(options),
        };

        Ok(Self {
            command,
            validation,
            help,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(list: &[&str]) -> anyhow::Result<ComputeArgs> {
        let args: Vec<String> = std::iter::once("smv-compute")
            .chain(list.iter().copied())
            .map(String::from)
            .collect();
        ComputeArgs::parse(&args)
    }

    #[test]
    fn all_is_the_default() {
        let args = parse(&[]).unwrap();
        assert_eq!(args.command, Command::All(FilterOptions::default()));
        assert!(!args.help);
    }

    #[test]
    fn double_subcommand() {
        let args = parse(&["double", "--no-validation"]).unwrap();
        assert_eq!(args.command, Command::Double);
        assert!(!args.validation);
    }

    #[test]
    fn filter_options() {
        let args = parse(&[
            "filter", "--input", "in.png", "-o", "out.png", "--filter", "Sepia", "--shader",
            "f.spv",
        ])
        .unwrap();

        assert_eq!(
            args.command,
            Command::Filter(FilterOptions {
                input: Some(PathBuf::from("in.png")),
                output: PathBuf::from("out.png"),
                filter: Filter::Sepia,
                shader: Some(PathBuf::from("f.spv")),
            })
        );
    }

    #[test]
    fn flags_without_subcommand_go_to_all() {
        let args = parse(&["--filter", "invert", "-h"]).unwrap();
        assert!(args.help);
        let Command::All(options) = args.command else {
            panic!("expected the all command");
        };
        assert_eq!(options.filter, Filter::Invert);
    }

    #[test]
    fn errors() {
        assert!(parse(&["filter", "--input"]).is_err());
        assert!(parse(&["filter", "--filter", "blur"]).is_err());
        assert!(parse(&["--bogus"]).is_err());
    }
}
