use clap::{Arg, Command};

pub const ARG_HASH_MEMORY_KIB: &str = "hash-memory-kib";
pub const ARG_HASH_ITERATIONS: &str = "hash-iterations";
pub const ARG_HASH_PARALLELISM: &str = "hash-parallelism";

// argon2 defaults: 19 MiB, 2 passes, 1 lane
#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_HASH_MEMORY_KIB)
                .long(ARG_HASH_MEMORY_KIB)
                .help("Argon2 memory cost in KiB")
                .default_value("19456")
                .env("SEQAUTH_HASH_MEMORY_KIB")
                .value_parser(clap::value_parser!(u32).range(8..)),
        )
        .arg(
            Arg::new(ARG_HASH_ITERATIONS)
                .long(ARG_HASH_ITERATIONS)
                .help("Argon2 number of passes")
                .default_value("2")
                .env("SEQAUTH_HASH_ITERATIONS")
                .value_parser(clap::value_parser!(u32).range(1..)),
        )
        .arg(
            Arg::new(ARG_HASH_PARALLELISM)
                .long(ARG_HASH_PARALLELISM)
                .help("Argon2 degree of parallelism")
                .default_value("1")
                .env("SEQAUTH_HASH_PARALLELISM")
                .value_parser(clap::value_parser!(u32).range(1..)),
        )
}
