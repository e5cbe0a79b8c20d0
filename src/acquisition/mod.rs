/// Acquisition layer: timed collection of a spectrum series through OMNIC.
///
/// One cycle:
/// ```text
///   sleep until next_start
///        │
///        ▼
///   collect.mac  (sample NNNN)  ──RunMacro──▶  OMNIC
///        │                                       │
///        │            processing.csv / .spa  ◀───┘
///        ▼
///   poll until processing.spa exists, wait for a stable size
///        │
///        ▼
///   rename → NNNN.spa, NNNN.csv
///        │
///        ▼
///   countdown, or stretch the interval on overrun
/// ```

pub mod clock;
pub mod instrument;
pub mod macro_file;
pub mod rename;
pub mod scheduler;
