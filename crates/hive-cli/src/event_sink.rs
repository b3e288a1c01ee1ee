//! A sink that prints every published event to stdout as it happens,
//! so a single CLI invocation shows the runtime's event stream
//! alongside its final result.

use hive_core::{Event, EventSink};
use owo_colors::OwoColorize;

#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutEventSink;

impl EventSink for StdoutEventSink {
    fn publish(&self, event: Event) {
        println!("  {} {}", event.name().bright_blue(), format!("{event:?}").dimmed());
    }
}
