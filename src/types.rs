/// One external-program step of a pipeline. `argv[0]` names the executable;
/// the parser never produces an empty `argv`.
#[derive(Debug, PartialEq, Eq)]
pub struct Stage<'a> {
	pub argv: Vec<&'a [u8]>,
}

/// A full parsed command line: stages in left-to-right order, the two
/// boundary redirections (first stage's stdin, last stage's stdout) and the
/// background flag. Borrowed from the input line, discarded after execution.
#[derive(Debug, PartialEq, Eq)]
pub struct Pipeline<'a> {
	pub stages: Vec<Stage<'a>>,
	pub stdin_redirect: Option<&'a [u8]>,
	pub stdout_redirect: Option<&'a [u8]>,
	pub background: bool,
}
