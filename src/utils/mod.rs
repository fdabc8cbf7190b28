use std::time::Instant;
use tracing::info;

/// Wall-clock span that logs its own duration when dropped. Scope one over
/// a batch or a single race to get timing without threading clocks around.
pub struct Stopwatch {
    label: String,
    start: Instant,
}

impl Stopwatch {
    pub fn scope(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            start: Instant::now(),
        }
    }
}

impl Drop for Stopwatch {
    fn drop(&mut self) {
        info!("{} took {:.2?}", self.label, self.start.elapsed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stopwatch_survives_nested_scopes() {
        let outer = Stopwatch::scope("outer");
        {
            let _inner = Stopwatch::scope("inner");
        }
        drop(outer);
    }
}
