//! Evaluate a postfix (RPN) expression from the command line.

use std::{
    collections::HashMap,
    time::{SystemTime, UNIX_EPOCH},
};

use anyhow::{bail, Context, Result};
use clap::Parser;
use rrd_data::rpn::{RpnCalculator, RpnExpression};

/// Evaluate a postfix (RPN) expression, e.g. "load,2,*".
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Comma or whitespace delimited postfix expression.
    expression: String,

    /// Variable binding, as name=value. May be repeated.
    #[arg(short, long)]
    var: Vec<String>,

    /// Value of the TIME token (defaults to the current time).
    #[arg(short, long)]
    timestamp: Option<f64>,

    /// List the variables the expression references instead of evaluating.
    #[arg(long, default_value_t = false)]
    names: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let expression = RpnExpression::parse(&args.expression);

    if args.names {
        for name in expression.variable_names() {
            println!("{name}");
        }
        return Ok(());
    }

    let mut vars: HashMap<Box<str>, f64> = HashMap::new();
    for binding in &args.var {
        let Some((name, value)) = binding.split_once('=') else {
            bail!("invalid binding '{binding}', expected name=value");
        };
        let value = value
            .parse()
            .with_context(|| format!("invalid value in '{binding}'"))?;
        vars.insert(name.into(), value);
    }

    let timestamp = args.timestamp.unwrap_or_else(|| {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0.0, |d| d.as_secs_f64())
    });

    let result = RpnCalculator::new(expression).calculate(&vars, timestamp)?;
    println!("{result}");

    Ok(())
}
