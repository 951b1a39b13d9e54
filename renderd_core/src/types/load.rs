//! System load average, consulted before dispatching more render work (spec
//! §4.4/§4.6; original `sys_utils.c`'s `get_load_avg()`). Shared by the
//! offline tools (`renderd_tools::daemon`) and the serving frontend
//! (`tileserve`), both of which gate work on the same 1-minute figure.

/// The 1-minute load average. Reads `/proc/loadavg`'s first field on Linux;
/// reports `0.0` (never blocks submission) where that file doesn't exist.
#[must_use]
pub fn load_average() -> f64 {
	std::fs::read_to_string("/proc/loadavg")
		.ok()
		.and_then(|text| text.split_whitespace().next().map(str::to_string))
		.and_then(|first| first.parse().ok())
		.unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn load_average_never_panics_when_proc_is_absent() {
		let _ = load_average();
	}
}
