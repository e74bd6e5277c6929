use crate::types::{Pipeline, Stage};

pub type ParseResult<T> = Result<T, String>;

struct Parser<'a> {
	line: &'a [u8],
	i: usize,
	stdin_redirect: Option<&'a [u8]>,
	stdout_redirect: Option<&'a [u8]>,
}

impl<'a> Parser<'a> {
	fn proceed_while<F>(&mut self, f: F) where F: Fn(u8) -> bool {
		while let Some(&c) = self.line.get(self.i) {
			if !f(c) { break; }
			self.i += 1;
		}
	}

	fn is_whitespace(c: u8) -> bool {
		matches!(c, b' ' | b'\t' | b'\n')
	}

	fn is_word(c: u8) -> bool {
		match c {
			b'<' | b'>' | b'&' | b'|' => false,
			_ => !Parser::is_whitespace(c),
		}
	}

	fn skip_whitespaces(&mut self) {
		self.proceed_while(Parser::is_whitespace);
	}

	fn read_word(&mut self) -> &'a [u8] {
		let orig = self.i;
		self.proceed_while(Parser::is_word);
		&self.line[orig .. self.i]
	}

	/// Consumes a `< path` or `> path` if one starts at the cursor. The path
	/// is recorded on the pipeline boundary; a repeated redirect overwrites
	/// the earlier one.
	fn parse_redirect(&mut self) -> ParseResult<bool> {
		let typ = match self.line.get(self.i) {
			Some(&b'<') => b'<',
			Some(&b'>') => b'>',
			_ => { return Ok(false); },
		};
		self.i += 1;
		self.skip_whitespaces();
		let target = self.read_word();
		if target.is_empty() {
			return Err("empty redirect target".to_string());
		}
		if typ == b'<' {
			self.stdin_redirect = Some(target);
		} else {
			self.stdout_redirect = Some(target);
		}
		Ok(true)
	}

	fn parse_stage(&mut self) -> ParseResult<Stage<'a>> {
		let mut argv: Vec<&'a [u8]> = vec![];
		loop {
			self.skip_whitespaces();
			if self.parse_redirect()? {
				continue;
			}
			let word = self.read_word();
			if word.is_empty() {
				break;
			}
			argv.push(word);
		}
		if argv.is_empty() {
			return Err("empty command".to_string());
		}
		Ok(Stage { argv })
	}

	fn parse_pipeline(&mut self) -> ParseResult<Pipeline<'a>> {
		let mut stages: Vec<Stage<'a>> = vec![];
		let mut background = false;

		loop {
			stages.push(self.parse_stage()?);
			match self.line.get(self.i) {
				Some(&b'|') => { self.i += 1; },
				Some(&b'&') => {
					self.i += 1;
					background = true;
					self.skip_whitespaces();
					if let Some(&c) = self.line.get(self.i) {
						return Err(format!("character after '&': '{}'", c as char));
					}
					break;
				},
				Some(&c) => { return Err(format!("unknown command separator: '{}'", c as char)); },
				None => { break; },
			}
		}
		Ok(Pipeline {
			stages,
			stdin_redirect: self.stdin_redirect,
			stdout_redirect: self.stdout_redirect,
			background,
		})
	}
}

pub fn parse(line: &[u8]) -> ParseResult<Pipeline<'_>> {
	let mut parser = Parser { line, i: 0, stdin_redirect: None, stdout_redirect: None };
	parser.parse_pipeline()
}
