//! An interactive shell for poking at allocators.
//!
//! Every block handed out is remembered by its base address, so later
//! commands only need `--base`.

use std::{
    collections::{hash_map::Entry, HashMap},
    fmt::Debug,
    ptr::NonNull,
    sync::Mutex,
};

use bytealloc::{
    Allocator, ArenaAllocator, Error, Layout, ReallocateOptions, StackAllocator, SystemAllocator,
    SystemResource,
};
use clap::Parser;
use linefeed::{Interface, ReadResult};

use crate::parsing::{Command, Kind};

mod parsing;

enum AnyAllocator {
    System(SystemAllocator<'static, SystemResource, Mutex<()>>),
    Stack(StackAllocator<'static, SystemResource, Mutex<()>>),
    Arena(ArenaAllocator<'static, SystemResource, Mutex<()>>),
}
impl AnyAllocator {
    fn create(
        name: &'static str,
        kind: Kind,
        capacity: usize,
        zeroed: bool,
    ) -> bytealloc::Result<Self> {
        Ok(match kind {
            Kind::System if zeroed => {
                Self::System(SystemAllocator::new_zeroed(name, SystemResource))
            }
            Kind::System => Self::System(SystemAllocator::new(name, SystemResource)),
            Kind::Stack => Self::Stack(StackAllocator::create(name, capacity, SystemResource)?),
            Kind::Arena => Self::Arena(ArenaAllocator::create(name, capacity, SystemResource)?),
        })
    }

    fn get(&self) -> &dyn Allocator {
        match self {
            Self::System(allocator) => allocator,
            Self::Stack(allocator) => allocator,
            Self::Arena(allocator) => allocator,
        }
    }
}
impl Debug for AnyAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::System(allocator) => allocator.fmt(f),
            Self::Stack(allocator) => allocator.fmt(f),
            Self::Arena(allocator) => allocator.fmt(f),
        }
    }
}

struct Session {
    allocator: AnyAllocator,
    blocks: HashMap<usize, Layout>,
}
impl Drop for Session {
    fn drop(&mut self) {
        let allocator = self.allocator.get();
        if allocator
            .features()
            .contains(bytealloc::FeatureFlags::FREE_AND_REALLOC)
            && !allocator
                .features()
                .contains(bytealloc::FeatureFlags::STACKLIKE)
        {
            for (base, layout) in self.blocks.drain() {
                if let Some(data) = NonNull::new(base as *mut u8) {
                    unsafe { allocator.deallocate(data, layout) };
                }
            }
        }
    }
}

fn explain(err: Error) {
    match err {
        Error::OutOfMemory => println!("The allocator is out of memory!"),
        Error::ConflictingFlags => println!("A side cannot both grow and shrink!"),
        Error::InfeasibleResize => {
            println!("That resize would leave nothing behind, or preferred is below required!")
        }
        Error::Unsupported => println!("This allocator cannot do that!"),
        Error::NotStackTop => println!("Only the top of the stack can be resized!"),
        Error::AllocZeroSize => println!("The capacity must not be zero!"),
        err => println!("{err}"),
    }
}

fn main() -> anyhow::Result<()> {
    let interface = Interface::new("bytealloc-repl")?;
    interface.set_prompt("[∴] ")?;

    let mut sessions: HashMap<String, Session> = HashMap::new();

    while let ReadResult::Input(command) = interface.read_line()? {
        match Command::try_parse_from(["[∴]"].into_iter().chain(command.split(' '))) {
            Ok(Command::Exit) => break,
            Ok(Command::Create {
                name,
                kind,
                capacity,
                zeroed,
            }) => match sessions.entry(name.clone()) {
                Entry::Vacant(entry) => {
                    match AnyAllocator::create(name.leak(), kind, capacity, zeroed) {
                        Ok(allocator) => {
                            println!("Created {kind:?} allocator {:?}", entry.key());
                            entry.insert(Session {
                                allocator,
                                blocks: HashMap::new(),
                            });
                        }
                        Err(err) => explain(err),
                    }
                }
                Entry::Occupied(_) => {
                    println!("There is already an allocator named {name:?}");
                }
            },
            Ok(Command::Delete { allocator: name }) => match sessions.remove(&name) {
                Some(_) => println!("Deleted allocator {name:?}!"),
                None => println!("There is no allocator named {name:?} :("),
            },
            Ok(Command::Alloc {
                allocator,
                size,
                align,
            }) => match sessions.get_mut(&allocator) {
                Some(session) => {
                    let layout = match Layout::from_size_align(size, align) {
                        Some(layout) => layout,
                        None => {
                            println!(
                                "The size must be non-zero and the alignment must be a power of two!"
                            );
                            continue;
                        }
                    };
                    match session.allocator.get().allocate(layout) {
                        Ok(block) => {
                            println!("Allocated {:#x} bytes at {:p}", block.size(), block.data());
                            session.blocks.insert(
                                block.data().as_ptr() as usize,
                                Layout::from_size_align(block.size(), align).unwrap_or(layout),
                            );
                        }
                        Err(err) => explain(err),
                    }
                }
                None => println!("There is no allocator named {allocator:?} :("),
            },
            Ok(Command::Realloc {
                allocator,
                base,
                expand_front,
                shrink_front,
                expand_back,
                shrink_back,
                preferred_front,
                preferred_back,
                keep_old,
                defragment,
            }) => {
                let Some(session) = sessions.get_mut(&allocator) else {
                    println!("There is no allocator named {allocator:?} :(");
                    continue;
                };
                let (Some(layout), Some(data)) = (
                    session.blocks.get(&base).copied(),
                    NonNull::new(base as *mut u8),
                ) else {
                    println!("There is no allocation at {base:#x}");
                    continue;
                };

                let mut options = ReallocateOptions::new(data, layout.size(), layout.align());
                if let Some(bytes) = expand_front {
                    options = options.expand_front(bytes, preferred_front.unwrap_or(bytes));
                }
                if let Some(bytes) = shrink_front {
                    options = options.shrink_front(bytes);
                }
                if let Some(bytes) = expand_back {
                    options = options.expand_back(bytes, preferred_back.unwrap_or(bytes));
                }
                if let Some(bytes) = shrink_back {
                    options = options.shrink_back(bytes);
                }
                if keep_old {
                    options = options.keep_old_nocopy();
                }
                if defragment {
                    options = options.try_defragment();
                }

                match unsafe { session.allocator.get().reallocate(&options) } {
                    Ok(block) => {
                        println!(
                            "Resized to {:#x} bytes at {:p} (original start: {:?}, kept: {})",
                            block.size(),
                            block.data(),
                            block.data_original_offset(),
                            block.kept()
                        );
                        if !block.kept() {
                            session.blocks.remove(&base);
                        }
                        if let Some(layout) = Layout::from_size_align(block.size(), layout.align())
                        {
                            session.blocks.insert(block.data().as_ptr() as usize, layout);
                        }
                    }
                    Err(err) => explain(err),
                }
            }
            Ok(Command::Free { allocator, base }) => match sessions.get_mut(&allocator) {
                Some(session) => match session.blocks.remove(&base) {
                    Some(layout) => {
                        if let Some(data) = NonNull::new(base as *mut u8) {
                            unsafe { session.allocator.get().deallocate(data, layout) };
                            println!("Freed {base:#x}");
                        }
                    }
                    None => println!("There is no allocation at {base:#x}"),
                },
                None => println!("There is no allocator named {allocator:?} :("),
            },
            Ok(Command::Clear { allocator }) => match sessions.get_mut(&allocator) {
                Some(session) => {
                    let features = session.allocator.get().features();
                    if features.contains(bytealloc::FeatureFlags::CLEARING) {
                        unsafe { session.allocator.get().clear() };
                        session.blocks.clear();
                        println!("Cleared {allocator:?}");
                    } else {
                        println!("{allocator:?} cannot be cleared!");
                    }
                }
                None => println!("There is no allocator named {allocator:?} :("),
            },
            Ok(Command::Features { allocator }) => match sessions.get(&allocator) {
                Some(session) => println!("{:?}", session.allocator.get().features()),
                None => println!("There is no allocator named {allocator:?} :("),
            },
            Ok(Command::Print { allocator: None }) => {
                if !sessions.is_empty() {
                    println!();
                    for session in sessions.values() {
                        println!("{:?}", session.allocator);
                    }
                } else {
                    println!("There are no allocators to print!");
                }
            }
            Ok(Command::Print {
                allocator: Some(allocator),
            }) => match sessions.get(&allocator) {
                Some(session) => {
                    println!("\n{:?}", session.allocator);
                    let mut blocks: Vec<_> = session.blocks.iter().collect();
                    blocks.sort_by_key(|(base, _)| **base);
                    for (base, layout) in blocks {
                        println!("  Block at {base:#x} (len: {:#x})", layout.size());
                    }
                }
                None => println!("There is no allocator named {allocator:?} :("),
            },
            Err(err) => {
                println!();
                err.print()?;
                println!();
                continue;
            }
        }
    }

    Ok(())
}
