use std::io::{self, BufWriter, Write};

use anyhow::{Context, Result};
use clap::Parser;
use devtokengen::{DevtokenGenerator, Template, DEFAULT_TOKEN_LEN};

const DEFAULT_TEMPLATE: &str = "curl http://127.0.0.1:9898/subscribe -d service=simserv \
     -d subscriber=usr.{{.Id}} -d pushservicetype=apns -d devtoken={{.Token}}";

/// Print sequential device tokens through a template, one per line.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Number of tokens.
    #[arg(short = 'n', default_value_t = 1)]
    count: usize,

    /// Output template; `{{.Id}}` is the line index, `{{.Token}}` the hex token.
    #[arg(long, default_value = DEFAULT_TEMPLATE)]
    template: String,

    /// Token length in bytes.
    #[arg(long, default_value_t = DEFAULT_TOKEN_LEN)]
    token_len: usize,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let template = Template::parse(&cli.template).context("template error")?;

    let mut generator = DevtokenGenerator::new(cli.token_len);
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    for id in 0..cli.count {
        let line = template.render(id, &generator.next_hex());
        writeln!(out, "{line}").context("writing to stdout")?;
    }
    out.flush().context("writing to stdout")?;

    Ok(())
}
