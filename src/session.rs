//! Interactive annotation session.
//! Line-oriented front end over `Editor`: pick a mark type, tap the board in
//! photo pixels, undo, clear, fill in the details and save into the collection.

use anyhow::{Context, Result, bail};
use dialoguer::Input;
use std::str::FromStr;

use crate::climb::{ClimbRecord, MarkType, Point};
use crate::editor::{BoardRect, ClimbDetails, Editor};
use crate::store::SetterCollection;

pub const HELP: &str = "\
Commands:
  type <start|mid|finish|foot>   select the mark type for new points
  tap <px> <py>                  add a point at board photo pixel (px, py)
  point <x> <y>                  add a point at normalized (x, y)
  undo                           remove the last point of the active type
  clear                          remove every point
  name|grade|fa|image <text>     set a detail field
  show                           print the draft
  save                           validate and save the climb
  quit                           leave without saving";

#[derive(Debug, Clone, PartialEq)]
pub enum SessionCommand {
    Type(MarkType),
    Tap { x: f64, y: f64 },
    Point { x: f64, y: f64 },
    Undo,
    Clear,
    Name(String),
    Grade(String),
    FirstAscent(String),
    Image(String),
    Show,
    Save,
    Quit,
    Help,
}

impl FromStr for SessionCommand {
    type Err = anyhow::Error;

    fn from_str(line: &str) -> Result<Self> {
        let line = line.trim();
        let (verb, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let rest = rest.trim();

        let command = match verb.to_ascii_lowercase().as_str() {
            "type" | "t" => SessionCommand::Type(rest.parse()?),
            "tap" => {
                let (x, y) = parse_pair(rest)?;
                SessionCommand::Tap { x, y }
            }
            "point" | "p" => {
                let (x, y) = parse_pair(rest)?;
                SessionCommand::Point { x, y }
            }
            "undo" | "u" => SessionCommand::Undo,
            "clear" => SessionCommand::Clear,
            "name" => SessionCommand::Name(rest.to_string()),
            "grade" => SessionCommand::Grade(rest.to_string()),
            "fa" => SessionCommand::FirstAscent(rest.to_string()),
            "image" => SessionCommand::Image(rest.to_string()),
            "show" | "s" => SessionCommand::Show,
            "save" => SessionCommand::Save,
            "quit" | "q" | "exit" => SessionCommand::Quit,
            "help" | "?" | "" => SessionCommand::Help,
            other => bail!("Unknown command '{}' (try 'help')", other),
        };
        Ok(command)
    }
}

fn parse_pair(args: &str) -> Result<(f64, f64)> {
    let mut parts = args.split(|c: char| c.is_whitespace() || c == ',').filter(|p| !p.is_empty());
    let (Some(x), Some(y), None) = (parts.next(), parts.next(), parts.next()) else {
        bail!("Expected two numbers, got '{}'", args);
    };
    let x = x.parse().with_context(|| format!("'{}' is not a number", x))?;
    let y = y.parse().with_context(|| format!("'{}' is not a number", y))?;
    Ok((x, y))
}

/// Result of applying one command.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Continue(String),
    Saved(ClimbRecord),
    Quit,
}

#[derive(Debug)]
pub struct Session {
    editor: Editor,
    details: ClimbDetails,
    board: BoardRect,
}

impl Session {
    pub fn new(editor: Editor, board: BoardRect) -> Self {
        let details = editor.details();
        Self { editor, details, board }
    }

    pub fn editor(&self) -> &Editor {
        &self.editor
    }

    pub fn apply(&mut self, command: SessionCommand) -> Outcome {
        let read_only = self.editor.is_read_only();
        let message = match command {
            SessionCommand::Quit => return Outcome::Quit,
            SessionCommand::Help => HELP.to_string(),
            SessionCommand::Show => self.summary(),
            _ if read_only => "This climb is read-only.".to_string(),
            SessionCommand::Type(kind) => {
                self.editor.set_active_mark_type(kind);
                format!("Placing {} holds", kind)
            }
            SessionCommand::Tap { x, y } => {
                let point = self.board.to_normalized(x, y);
                self.add(point)
            }
            SessionCommand::Point { x, y } => {
                let point = BoardRect::UNIT.to_normalized(x, y);
                self.add(point)
            }
            SessionCommand::Undo => match self.editor.undo_last() {
                Some(_) => format!("Removed last {} hold", self.editor.active_mark_type()),
                None => format!("No {} holds to undo", self.editor.active_mark_type()),
            },
            SessionCommand::Clear => {
                self.editor.clear_all();
                "Cleared all holds".to_string()
            }
            SessionCommand::Name(text) => set_field(&mut self.details.name, "Name", text),
            SessionCommand::Grade(text) => set_field(&mut self.details.grade, "Grade", text),
            SessionCommand::FirstAscent(text) => set_field(&mut self.details.first_ascent, "First ascent", text),
            SessionCommand::Image(text) => set_field(&mut self.details.image, "Image", text),
            SessionCommand::Save => match self.editor.commit(self.details.clone()) {
                Ok(record) => {
                    self.details = self.editor.details();
                    return Outcome::Saved(record);
                }
                Err(e) => e.to_string(),
            },
        };
        Outcome::Continue(message)
    }

    fn add(&mut self, point: Point) -> String {
        let kind = self.editor.active_mark_type();
        self.editor.add_point(point);
        format!(
            "Added {} hold at ({:.4}, {:.4}) [{} total]",
            kind,
            point.x,
            point.y,
            self.editor.draft().marks(kind).len()
        )
    }

    pub fn summary(&self) -> String {
        let draft = self.editor.draft();
        let counts = MarkType::ALL
            .iter()
            .map(|kind| format!("{} {}", kind, draft.marks(*kind).len()))
            .collect::<Vec<_>>()
            .join(" • ");
        format!(
            "{} [{}]\n  {}\n  active: {}{}\n  name: {}\n  grade: {}\n  first ascent: {}\n  image: {}",
            draft.id,
            self.editor.mode(),
            counts,
            self.editor.active_mark_type(),
            if self.editor.is_read_only() { " (read-only)" } else { "" },
            self.details.name,
            self.details.grade,
            self.details.first_ascent,
            self.details.image,
        )
    }
}

fn set_field(field: &mut String, label: &str, text: String) -> String {
    *field = text;
    format!("{} set to '{}'", label, field)
}

/// Prompts for commands until the climb is saved or the user quits.
pub fn run(mut session: Session, collection: &mut SetterCollection) -> Result<()> {
    println!("{}\n\n{}", HELP, session.summary());
    loop {
        let line = Input::<String>::new()
            .with_prompt(session.editor().active_mark_type().as_str())
            .allow_empty(true)
            .interact_text()
            .context("Failed to read command")?;

        let command = match line.parse::<SessionCommand>() {
            Ok(command) => command,
            Err(e) => {
                println!("{}", e);
                continue;
            }
        };

        match session.apply(command) {
            Outcome::Continue(message) => println!("{}", message),
            Outcome::Saved(record) => {
                let name = record.name.clone();
                collection.save_climb(record)?;
                println!("Saved '{}'", name);
                return Ok(());
            }
            Outcome::Quit => return Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::climb::Point;
    use crate::config::Mode;

    fn session(mode: Mode) -> Session {
        Session::new(Editor::new(mode), BoardRect::from_size(400, 200))
    }

    fn run_lines(session: &mut Session, lines: &[&str]) -> Vec<Outcome> {
        lines
            .iter()
            .map(|line| session.apply(line.parse().unwrap()))
            .collect()
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!("type finish".parse::<SessionCommand>().unwrap(), SessionCommand::Type(MarkType::Finish));
        assert_eq!(
            "tap 120, 40".parse::<SessionCommand>().unwrap(),
            SessionCommand::Tap { x: 120.0, y: 40.0 }
        );
        assert_eq!(
            "name  Pinch Party ".parse::<SessionCommand>().unwrap(),
            SessionCommand::Name("Pinch Party".into())
        );
        assert_eq!("".parse::<SessionCommand>().unwrap(), SessionCommand::Help);
        assert!("tap 1".parse::<SessionCommand>().is_err());
        assert!("tap 1 2 3".parse::<SessionCommand>().is_err());
        assert!("type crimp".parse::<SessionCommand>().is_err());
        assert!("jump".parse::<SessionCommand>().is_err());
    }

    #[test]
    fn test_tap_maps_pixels_and_clamps() {
        let mut session = session(Mode::Setter);
        run_lines(&mut session, &["tap 100 50", "tap 900 -20"]);
        let start: Vec<Point> = session.editor().draft().start.iter().filter_map(|e| e.as_point()).collect();
        assert_eq!(start, vec![Point::new(0.25, 0.25), Point::new(1.0, 0.0)]);
    }

    #[test]
    fn test_full_session_saves_record() {
        let mut session = session(Mode::Setter);
        let outcomes = run_lines(
            &mut session,
            &["save", "name Sloper Traverse", "point 0.1 0.9", "type finish", "point 0.9 0.1", "grade V5"],
        );
        assert_eq!(outcomes[0], Outcome::Continue("Please enter a name.".into()));

        match session.apply(SessionCommand::Save) {
            Outcome::Saved(record) => {
                assert_eq!(record.name, "Sloper Traverse");
                assert_eq!(record.grade, "V5");
                assert_eq!(record.count_marks(), 2);
            }
            other => panic!("expected save, got {:?}", other),
        }
        assert_eq!(session.editor().draft().count_marks(), 0);
    }

    #[test]
    fn test_undo_message_names_active_type() {
        let mut session = session(Mode::Setter);
        let outcomes = run_lines(&mut session, &["point 0.5 0.5", "type mid", "undo"]);
        assert_eq!(outcomes[2], Outcome::Continue("No mid holds to undo".into()));
        assert_eq!(session.editor().draft().start.len(), 1);
    }

    #[test]
    fn test_read_only_session_rejects_edits() {
        let mut session = session(Mode::Viewer);
        let outcomes = run_lines(&mut session, &["tap 10 10", "name X", "save"]);
        for outcome in outcomes {
            assert_eq!(outcome, Outcome::Continue("This climb is read-only.".into()));
        }
        assert!(matches!(session.apply(SessionCommand::Show), Outcome::Continue(text) if text.contains("(read-only)")));
        assert_eq!(session.apply(SessionCommand::Quit), Outcome::Quit);
    }
}
