//! Console command catalog.
//!
//! The parser, help output, and completion engine all read this table so the
//! keywords and usage strings stay in sync.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandTag {
    Suspend,
    Screen,
    Active,
    Inactive,
    Rail,
    Cpus,
    Irq,
    Resched,
    Idle,
    Advance,
    Status,
    Help,
}

/// Static description of one console command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CommandSpec {
    pub name: &'static str,
    pub tag: CommandTag,
    pub usage: &'static str,
    pub summary: &'static str,
    /// Keywords accepted as the first argument, used for completion.
    pub keywords: &'static [&'static str],
}

const ON_OFF: [&str; 2] = ["on", "off"];

const COMMANDS: [CommandSpec; 12] = [
    CommandSpec {
        name: "suspend",
        tag: CommandTag::Suspend,
        usage: "suspend prepare|post",
        summary: "deliver a suspend-prepare or post-suspend notification",
        keywords: &["prepare", "post"],
    },
    CommandSpec {
        name: "screen",
        tag: CommandTag::Screen,
        usage: "screen on|off",
        summary: "report the display state",
        keywords: &ON_OFF,
    },
    CommandSpec {
        name: "active",
        tag: CommandTag::Active,
        usage: "active",
        summary: "mark the external block active",
        keywords: &[],
    },
    CommandSpec {
        name: "inactive",
        tag: CommandTag::Inactive,
        usage: "inactive [<duration>]",
        summary: "clear external activity after a debounce delay",
        keywords: &[],
    },
    CommandSpec {
        name: "rail",
        tag: CommandTag::Rail,
        usage: "rail need|release [<duration>]",
        summary: "request or release the full power rail",
        keywords: &["need", "release"],
    },
    CommandSpec {
        name: "cpus",
        tag: CommandTag::Cpus,
        usage: "cpus <count>",
        summary: "set the number of online execution units",
        keywords: &[],
    },
    CommandSpec {
        name: "irq",
        tag: CommandTag::Irq,
        usage: "irq on|off",
        summary: "latch or clear a pending interrupt",
        keywords: &ON_OFF,
    },
    CommandSpec {
        name: "resched",
        tag: CommandTag::Resched,
        usage: "resched on|off",
        summary: "raise or drop a reschedule request",
        keywords: &ON_OFF,
    },
    CommandSpec {
        name: "idle",
        tag: CommandTag::Idle,
        usage: "idle",
        summary: "run one idle entry",
        keywords: &[],
    },
    CommandSpec {
        name: "advance",
        tag: CommandTag::Advance,
        usage: "advance <duration>",
        summary: "move the virtual clock forward and run due work",
        keywords: &[],
    },
    CommandSpec {
        name: "status",
        tag: CommandTag::Status,
        usage: "status",
        summary: "display flags, idle, and cluster state",
        keywords: &[],
    },
    CommandSpec {
        name: "help",
        tag: CommandTag::Help,
        usage: "help [topic]",
        summary: "show help for a command",
        keywords: &[],
    },
];

/// Returns the full command catalog.
#[must_use]
pub const fn commands() -> &'static [CommandSpec] {
    &COMMANDS
}

/// Finds a command by name (case insensitive).
#[must_use]
pub fn find(name: &str) -> Option<&'static CommandSpec> {
    COMMANDS
        .iter()
        .find(|command| command.name.eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_ignores_case() {
        assert_eq!(find("RaIl").map(|spec| spec.tag), Some(CommandTag::Rail));
        assert!(find("reboot").is_none());
    }

    #[test]
    fn usage_starts_with_name() {
        for spec in commands() {
            assert!(spec.usage.starts_with(spec.name), "{}", spec.name);
        }
    }
}
