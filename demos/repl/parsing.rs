use clap::{Parser, ValueEnum};
use clap_num::maybe_hex;

#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum Kind {
    #[default]
    System,
    Stack,
    Arena,
}

#[derive(Parser, Debug)]
#[command(disable_help_flag = true)]
pub enum Command {
    Create {
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "system")]
        kind: Kind,
        #[arg(long, value_parser=maybe_hex::<usize>, default_value = "0x1000")]
        capacity: usize,
        #[arg(long)]
        zeroed: bool,
    },
    Delete {
        #[arg(long)]
        allocator: String,
    },
    Alloc {
        #[arg(long)]
        allocator: String,

        #[arg(long, value_parser=maybe_hex::<usize>)]
        size: usize,
        #[arg(long, value_parser=maybe_hex::<usize>, default_value = "0x10")]
        align: usize,
    },
    Realloc {
        #[arg(long)]
        allocator: String,
        #[arg(long, value_parser=maybe_hex::<usize>)]
        base: usize,

        #[arg(long, value_parser=maybe_hex::<usize>)]
        expand_front: Option<usize>,
        #[arg(long, value_parser=maybe_hex::<usize>)]
        shrink_front: Option<usize>,
        #[arg(long, value_parser=maybe_hex::<usize>)]
        expand_back: Option<usize>,
        #[arg(long, value_parser=maybe_hex::<usize>)]
        shrink_back: Option<usize>,
        #[arg(long, value_parser=maybe_hex::<usize>)]
        preferred_front: Option<usize>,
        #[arg(long, value_parser=maybe_hex::<usize>)]
        preferred_back: Option<usize>,

        #[arg(long)]
        keep_old: bool,
        #[arg(long)]
        defragment: bool,
    },
    Free {
        #[arg(long)]
        allocator: String,

        #[arg(long, value_parser=maybe_hex::<usize>)]
        base: usize,
    },
    Clear {
        #[arg(long)]
        allocator: String,
    },
    Features {
        #[arg(long)]
        allocator: String,
    },
    Print {
        #[arg(long)]
        allocator: Option<String>,
    },

    Exit,
}
