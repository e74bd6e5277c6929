mod exec;
mod parser;
mod reap;
mod types;

use std::io;
use io::BufRead;
use io::Write;

const PROMPT: &[u8] = b"> ";

/// Strips leading and trailing ASCII whitespace from a raw input line.
fn trim(line: &[u8]) -> &[u8] {
	let start = match line.iter().position(|c| !c.is_ascii_whitespace()) {
		Some(i) => i,
		None => return &[],
	};
	let end = line.iter().rposition(|c| !c.is_ascii_whitespace()).unwrap() + 1;
	&line[start .. end]
}

fn main() {
	if let Err(e) = reap::install() {
		let _ = writeln!(io::stderr(),
			"lsh: cannot install child reaper: {}; finished background processes will linger as zombies", e);
	}

	let mut stdout = io::stdout();
	let stdin = io::stdin();
	let mut stdin = stdin.lock();
	loop {
		let _ = stdout.write_all(PROMPT);
		let _ = stdout.flush();

		let mut line: Vec<u8> = vec![];
		match stdin.read_until(b'\n', &mut line) {
			Ok(0) | Err(_) => break,
			Ok(_) => {},
		}
		let line = trim(&line);
		if line.is_empty() {
			continue;
		}

		match parser::parse(line) {
			Ok(pipeline) => {
				if let Err(e) = exec::execute(&pipeline) {
					let _ = writeln!(io::stderr(), "lsh: {}", e);
				}
			},
			Err(e) => {
				let _ = writeln!(io::stderr(), "lsh: parse error: {}", e);
			},
		}
	}
}

#[cfg(test)]
mod tests {
	use super::trim;

	#[test]
	fn trim_strips_both_ends() {
		assert_eq!(trim(b"  ls -l \n"), b"ls -l");
		assert_eq!(trim(b"ls"), b"ls");
		assert_eq!(trim(b" \t \n"), b"");
		assert_eq!(trim(b""), b"");
	}
}
