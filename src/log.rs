use env_logger::Builder;
use log::LevelFilter;
use std::io::Write;

fn format(builder: &mut Builder) -> &mut Builder {
    builder.format(|buf, record| {
        writeln!(
            buf,
            "{} [{}] {}",
            buf.timestamp_seconds(),
            record.level(),
            record.args()
        )
    })
}

/// Installs the global logger at `level`. `RUST_LOG` still takes precedence
/// for individual modules.
pub fn build_logger_for_level(level: LevelFilter) {
    let mut builder = Builder::new();
    format(&mut builder).filter_level(level).parse_env("RUST_LOG").init();
}

pub fn build_logger() {
    let mut builder = Builder::from_default_env();
    format(&mut builder).init();
}
