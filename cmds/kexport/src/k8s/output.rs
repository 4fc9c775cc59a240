//! Terminal output for export previews and summaries.
//!
//! Diffs are highlighted with syntect's `diff` syntax; the ANSI conversion is
//! modeled on bat's terminal.rs.

use std::{
	io::{IsTerminal, Write},
	sync::OnceLock,
};

use nu_ansi_term::{Color, Style};
use serde::Deserialize;
use syntect::{
	easy::HighlightLines,
	highlighting::{self, FontStyle, Theme, ThemeSet},
	parsing::{SyntaxReference, SyntaxSet},
};
use thiserror::Error;
use tracing::instrument;

use super::diff::ManifestDiff;
use crate::export::ExportSummary;

/// Errors that can occur while writing terminal output.
#[derive(Debug, Error)]
pub enum OutputError {
	#[error("writing output")]
	Write(#[from] std::io::Error),

	#[error("syntax highlighting not available: {0}")]
	SyntaxNotFound(String),

	#[error("theme not available: {0}")]
	ThemeNotFound(String),
}

/// When to emit ANSI colors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorMode {
	/// Color when stdout is a terminal.
	#[default]
	Auto,
	Always,
	Never,
}

impl ColorMode {
	pub fn should_colorize(self) -> bool {
		match self {
			ColorMode::Auto => std::io::stdout().is_terminal(),
			ColorMode::Always => true,
			ColorMode::Never => false,
		}
	}
}

static SYNTAX_SET: OnceLock<SyntaxSet> = OnceLock::new();
static THEME_SET: OnceLock<ThemeSet> = OnceLock::new();

const THEME: &str = "base16-ocean.dark";

fn syntax_set() -> &'static SyntaxSet {
	SYNTAX_SET.get_or_init(SyntaxSet::load_defaults_newlines)
}

fn theme_set() -> &'static ThemeSet {
	THEME_SET.get_or_init(ThemeSet::load_defaults)
}

/// Convert a syntect color to a nu_ansi_term color.
fn to_ansi_color(color: highlighting::Color) -> Option<Color> {
	match color.a {
		// Palette colors are encoded with alpha=0 and the index in red.
		0 => Some(match color.r {
			0x00 => Color::Black,
			0x01 => Color::Red,
			0x02 => Color::Green,
			0x03 => Color::Yellow,
			0x04 => Color::Blue,
			0x05 => Color::Purple,
			0x06 => Color::Cyan,
			0x07 => Color::White,
			n => Color::Fixed(n),
		}),
		// Terminal default.
		1 => None,
		_ => Some(Color::Rgb(color.r, color.g, color.b)),
	}
}

fn as_terminal_escaped(style: highlighting::Style, text: &str) -> String {
	if text.is_empty() {
		return String::new();
	}

	let mut ansi_style = Style {
		foreground: to_ansi_color(style.foreground),
		..Style::default()
	};
	if style.font_style.contains(FontStyle::BOLD) {
		ansi_style = ansi_style.bold();
	}
	if style.font_style.contains(FontStyle::UNDERLINE) {
		ansi_style = ansi_style.underline();
	}
	if style.font_style.contains(FontStyle::ITALIC) {
		ansi_style = ansi_style.italic();
	}

	ansi_style.paint(text).to_string()
}

/// Writes sanitization previews and the end-of-run summary.
pub struct DiffOutput<W: Write> {
	writer: W,
	use_color: bool,
	diff_syntax: &'static SyntaxReference,
	theme: Theme,
}

impl<W: Write> DiffOutput<W> {
	pub fn new(writer: W, color_mode: ColorMode) -> Result<Self, OutputError> {
		let diff_syntax = syntax_set()
			.find_syntax_by_extension("diff")
			.ok_or_else(|| OutputError::SyntaxNotFound("diff".to_string()))?;
		let theme = theme_set()
			.themes
			.get(THEME)
			.cloned()
			.ok_or_else(|| OutputError::ThemeNotFound(THEME.to_string()))?;

		Ok(Self {
			writer,
			use_color: color_mode.should_colorize(),
			diff_syntax,
			theme,
		})
	}

	/// Write the preview for one object. Unchanged objects print nothing.
	#[instrument(skip_all, fields(resource = %diff.display_name()))]
	pub fn write_diff(&mut self, diff: &ManifestDiff) -> Result<(), OutputError> {
		if diff.has_changes() {
			self.write_highlighted(&diff.unified_diff())?;
		}
		Ok(())
	}

	/// Print one line per kind that ran, the skipped targets, and a total.
	#[instrument(skip_all)]
	pub fn write_summary(&mut self, summary: &ExportSummary) -> Result<(), OutputError> {
		let per_kind: Vec<String> = summary
			.kinds
			.iter()
			.map(|k| {
				format!(
					"{}: {} exported, {} skipped",
					k.kind,
					k.exported.len(),
					k.skipped.len()
				)
			})
			.collect();
		let skipped: Vec<String> = summary
			.kinds
			.iter()
			.flat_map(|k| {
				k.skipped
					.iter()
					.map(move |(name, reason)| format!("{}/{}: {}", k.kind, name, reason))
			})
			.collect();

		if !per_kind.is_empty() {
			self.write_section("Kinds", &per_kind, Color::Green)?;
		}
		if !skipped.is_empty() {
			self.write_section("Skipped", &skipped, Color::Yellow)?;
		}

		writeln!(self.writer)?;
		let total = format!(
			"Total: {} object(s) exported to {}, {} skipped",
			summary.exported_count(),
			summary.scope_root.display(),
			summary.skipped_count()
		);
		if self.use_color {
			writeln!(self.writer, "{}", Style::new().bold().paint(total))?;
		} else {
			writeln!(self.writer, "{total}")?;
		}
		Ok(())
	}

	fn write_highlighted(&mut self, content: &str) -> Result<(), OutputError> {
		if !self.use_color {
			write!(self.writer, "{content}")?;
			return Ok(());
		}

		let ss = syntax_set();
		let mut highlighter = HighlightLines::new(self.diff_syntax, &self.theme);
		for line in content.lines() {
			match highlighter.highlight_line(line, ss) {
				Ok(regions) => {
					for (style, text) in regions {
						write!(self.writer, "{}", as_terminal_escaped(style, text))?;
					}
					writeln!(self.writer)?;
				}
				Err(_) => writeln!(self.writer, "{line}")?,
			}
		}
		Ok(())
	}

	fn write_section(
		&mut self,
		title: &str,
		items: &[String],
		color: Color,
	) -> Result<(), OutputError> {
		if self.use_color {
			writeln!(
				self.writer,
				"\n{}",
				Style::new().bold().fg(color).paint(format!("{title}:"))
			)?;
		} else {
			writeln!(self.writer, "\n{title}:")?;
		}

		for item in items {
			if self.use_color {
				writeln!(self.writer, "  {}", Style::new().fg(color).paint(item))?;
			} else {
				writeln!(self.writer, "  {item}")?;
			}
		}
		Ok(())
	}
}
