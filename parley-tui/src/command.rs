//! The `:` command line.
//!
//! A command is a name followed by arguments. Arguments are separated by whitespace; an
//! argument containing spaces can be written in double quotes.

use std::path::PathBuf;

use parley_client::Picture;

#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    Login {
        email: String,
        password: String,
    },
    Signup {
        name: String,
        email: String,
        password: String,
        picture: Picture,
    },
    Logout,
    Profile {
        name: String,
        picture: Picture,
    },
    Search(String),
    /// Creates a group from the members picked in the search popup.
    Group(String),
    Leave,
    Delete,
    Communities,
    Community {
        name: String,
        description: String,
        image: String,
    },
    Status {
        media_url: String,
        caption: String,
    },
    Attach(PathBuf),
    Notifications,
    Statuses,
    Refresh,
    Help,
    Quit,
}

#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum CommandError {
    #[error("not a command: {0}")]
    Syntax(String),
    #[error("unknown command: {0}")]
    Unknown(String),
    #[error("usage: {0}")]
    Usage(&'static str),
}

/// Name and usage of every command, for the help popup.
pub const USAGE: &[(&str, &str)] = &[
    ("login", ":login <email> <password>"),
    ("signup", ":signup <name> <email> <password> [picture url or file]"),
    ("logout", ":logout"),
    ("profile", ":profile <name> [picture url or file]"),
    ("search", ":search <query>"),
    ("group", ":group <name>"),
    ("leave", ":leave"),
    ("delete", ":delete"),
    ("communities", ":communities"),
    ("community", ":community <name> <description> [image url]"),
    ("status", ":status <media url> [caption]"),
    ("attach", ":attach <file> (the composer text becomes the caption)"),
    ("notifications", ":notifications"),
    ("statuses", ":statuses"),
    ("refresh", ":refresh"),
    ("help", ":help"),
    ("quit", ":quit"),
];

fn usage(name: &str) -> CommandError {
    let text = USAGE
        .iter()
        .find(|(command, _)| *command == name)
        .map_or("", |(_, usage)| *usage);
    CommandError::Usage(text)
}

fn words(input: &str) -> nom::IResult<&str, (&str, Vec<String>)> {
    use nom::{
        branch::alt,
        bytes::complete::{is_not, take_till1},
        character::complete::{char, multispace0, multispace1},
        combinator::{all_consuming, map},
        multi::many0,
        sequence::{delimited, preceded, terminated, tuple},
    };

    let quoted = map(
        delimited(char('"'), nom::combinator::opt(is_not("\"")), char('"')),
        |s: Option<&str>| s.unwrap_or_default().to_owned(),
    );
    let bare = map(take_till1(char::is_whitespace), str::to_owned);
    all_consuming(delimited(
        multispace0,
        tuple((
            nom_unicode::complete::alpha1,
            many0(preceded(multispace1, alt((quoted, bare)))),
        )),
        terminated(multispace0, nom::combinator::eof),
    ))(input)
}

/// A URL stays a URL; anything else names a local file.
fn picture(arg: Option<String>) -> Picture {
    match arg {
        None => Picture::Keep,
        Some(url) if url.starts_with("http://") || url.starts_with("https://") => Picture::Url(url),
        Some(path) => Picture::File(path.into()),
    }
}

impl std::str::FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        use nom::Finish;

        let line = line.strip_prefix(':').unwrap_or(line);
        let (_, (name, args)) = words(line)
            .finish()
            .map_err(|_| CommandError::Syntax(line.to_owned()))?;
        let mut args = args.into_iter();
        let mut required = || args.next().ok_or_else(|| usage(name));
        let command = match name {
            "login" => Self::Login {
                email: required()?,
                password: required()?,
            },
            "signup" => Self::Signup {
                name: required()?,
                email: required()?,
                password: required()?,
                picture: picture(args.next()),
            },
            "logout" => Self::Logout,
            "profile" => Self::Profile {
                name: required()?,
                picture: picture(args.next()),
            },
            "search" => Self::Search(args.by_ref().collect::<Vec<_>>().join(" ")),
            "group" => Self::Group(args.by_ref().collect::<Vec<_>>().join(" ")),
            "leave" => Self::Leave,
            "delete" => Self::Delete,
            "communities" => Self::Communities,
            "community" => Self::Community {
                name: required()?,
                description: required()?,
                image: args.next().unwrap_or_default(),
            },
            "status" => Self::Status {
                media_url: required()?,
                caption: args.by_ref().collect::<Vec<_>>().join(" "),
            },
            "attach" => Self::Attach(required()?.into()),
            "notifications" | "n" => Self::Notifications,
            "statuses" => Self::Statuses,
            "refresh" => Self::Refresh,
            "help" | "h" => Self::Help,
            "quit" | "q" => Self::Quit,
            other => return Err(CommandError::Unknown(other.to_owned())),
        };
        if args.next().is_some() {
            return Err(usage(name));
        }
        Ok(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Result<Command, CommandError> {
        line.parse()
    }

    #[test]
    fn parses_account_commands() {
        assert_eq!(
            parse(":login ann@example.com hunter2"),
            Ok(Command::Login {
                email: "ann@example.com".into(),
                password: "hunter2".into(),
            })
        );
        assert_eq!(
            parse("signup \"Ann Lee\" ann@example.com pw ~/me.png"),
            Ok(Command::Signup {
                name: "Ann Lee".into(),
                email: "ann@example.com".into(),
                password: "pw".into(),
                picture: Picture::File("~/me.png".into()),
            })
        );
        assert_eq!(
            parse("profile Ann https://img/ann.png"),
            Ok(Command::Profile {
                name: "Ann".into(),
                picture: Picture::Url("https://img/ann.png".into()),
            })
        );
        assert_eq!(parse("logout"), Ok(Command::Logout));
    }

    #[test]
    fn parses_chat_commands() {
        assert_eq!(parse("search ben smith"), Ok(Command::Search("ben smith".into())));
        assert_eq!(parse("search"), Ok(Command::Search(String::new())));
        assert_eq!(parse("group road trip"), Ok(Command::Group("road trip".into())));
        assert_eq!(parse("leave"), Ok(Command::Leave));
        assert_eq!(parse("delete"), Ok(Command::Delete));
        assert_eq!(parse("attach clip.mp4"), Ok(Command::Attach("clip.mp4".into())));
        assert_eq!(parse("communities"), Ok(Command::Communities));
        assert_eq!(
            parse("community rust \"all things crab\""),
            Ok(Command::Community {
                name: "rust".into(),
                description: "all things crab".into(),
                image: String::new(),
            })
        );
    }

    #[test]
    fn parses_status_and_ui_commands() {
        assert_eq!(
            parse("status https://img/a.png at the beach"),
            Ok(Command::Status {
                media_url: "https://img/a.png".into(),
                caption: "at the beach".into(),
            })
        );
        assert_eq!(parse("  statuses  "), Ok(Command::Statuses));
        assert_eq!(parse("n"), Ok(Command::Notifications));
        assert_eq!(parse("refresh"), Ok(Command::Refresh));
        assert_eq!(parse("help"), Ok(Command::Help));
        assert_eq!(parse("q"), Ok(Command::Quit));
    }

    #[test]
    fn reports_bad_input() {
        assert_eq!(parse("fly"), Err(CommandError::Unknown("fly".into())));
        assert_eq!(
            parse("login ann@example.com"),
            Err(CommandError::Usage(":login <email> <password>"))
        );
        assert!(matches!(parse("logout now"), Err(CommandError::Usage(_))));
        assert!(matches!(parse("\"quoted\""), Err(CommandError::Syntax(_))));
        assert!(matches!(parse(""), Err(CommandError::Syntax(_))));
        assert_eq!(
            parse("community x \"\""),
            Ok(Command::Community {
                name: "x".into(),
                description: String::new(),
                image: String::new(),
            })
        );
    }
}
