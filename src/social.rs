//! Commands that exist for fun.

use std::{fmt, str::FromStr, sync::OnceLock, time::Duration};

use rand::{seq::SliceRandom, Rng};
use regex::Regex;
use serenity::{model::id::UserId, prelude::Mentionable};

use crate::{Error, Result};

pub const MAX_DICE: u32 = 100;
pub const MAX_SIDES: u32 = 1000;
pub const MAX_MODIFIER: i64 = 1_000_000;

fn dice_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(\d*)[dD](\d+)(?:\s*([+-])\s*(\d+))?$").expect("dice pattern is valid")
    })
}

/// A dice expression like `3d6+2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dice {
    pub count: u32,
    pub sides: u32,
    pub modifier: i64,
}

impl FromStr for Dice {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || {
            Error::invalid(format!(
                "`{}` isn't a dice expression; try something like `2d6+1`.",
                s
            ))
        };
        let captures = dice_pattern().captures(s.trim()).ok_or_else(invalid)?;

        let count = match captures.get(1).map(|m| m.as_str()) {
            None | Some("") => 1,
            Some(count) => count.parse().map_err(|_| invalid())?,
        };
        let sides: u32 = captures[2].parse().map_err(|_| invalid())?;
        let modifier = match (captures.get(3), captures.get(4)) {
            (Some(sign), Some(value)) => {
                let value = value
                    .as_str()
                    .parse::<i64>()
                    .ok()
                    .filter(|v| *v <= MAX_MODIFIER)
                    .ok_or_else(|| {
                        Error::invalid(format!(
                            "Modifiers can be at most {}.",
                            MAX_MODIFIER
                        ))
                    })?;
                if sign.as_str() == "-" {
                    -value
                } else {
                    value
                }
            }
            _ => 0,
        };

        if !(1..=MAX_DICE).contains(&count) {
            return Err(Error::invalid(format!(
                "You can roll between 1 and {} dice at once.",
                MAX_DICE
            )));
        }
        if !(2..=MAX_SIDES).contains(&sides) {
            return Err(Error::invalid(format!(
                "Dice must have between 2 and {} sides.",
                MAX_SIDES
            )));
        }
        Ok(Dice {
            count,
            sides,
            modifier,
        })
    }
}

impl fmt::Display for Dice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}d{}", self.count, self.sides)?;
        match self.modifier {
            0 => Ok(()),
            m if m > 0 => write!(f, "+{}", m),
            m => write!(f, "{}", m),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Roll {
    pub dice: Dice,
    pub rolls: Vec<u32>,
    pub total: i64,
}

impl Dice {
    pub fn roll(&self, rng: &mut impl Rng) -> Roll {
        let rolls: Vec<u32> = (0..self.count)
            .map(|_| rng.gen_range(1..=self.sides))
            .collect();
        let total = rolls.iter().map(|&r| i64::from(r)).sum::<i64>() + self.modifier;
        Roll {
            dice: *self,
            rolls,
            total,
        }
    }
}

impl fmt::Display for Roll {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rolls: Vec<String> = self.rolls.iter().map(u32::to_string).collect();
        write!(
            f,
            "Rolled `{}`: [{}] = **{}**",
            self.dice,
            rolls.join(", "),
            self.total
        )
    }
}

pub fn roll(expression: &str) -> Result<String> {
    let dice: Dice = expression.parse()?;
    Ok(dice.roll(&mut rand::thread_rng()).to_string())
}

pub fn hug(from: UserId, to: UserId) -> String {
    if from == to {
        format!("{} hugs themselves. Self-care is important.", from.mention())
    } else {
        format!("{} gives {} a warm hug.", from.mention(), to.mention())
    }
}

/// Answers used when the configuration doesn't supply any.
pub const EIGHT_BALL_ANSWERS: &[&str] = &[
    "It is certain.",
    "Without a doubt.",
    "You may rely on it.",
    "Most likely.",
    "Signs point to yes.",
    "Reply hazy, try again.",
    "Ask again later.",
    "Cannot predict now.",
    "Don't count on it.",
    "My sources say no.",
    "Very doubtful.",
];

pub fn eight_ball(answers: &[String], question: &str) -> String {
    let mut rng = rand::thread_rng();
    let answer = answers
        .choose(&mut rng)
        .map(String::as_str)
        .or_else(|| EIGHT_BALL_ANSWERS.choose(&mut rng).copied())
        .unwrap_or("Ask again later.");
    format!("> {}\n:8ball: {}", question.trim(), answer)
}

pub fn info(name: &str, uptime: Duration) -> String {
    // Whole seconds read better than nanosecond precision
    let uptime = Duration::from_secs(uptime.as_secs());
    format!(
        "**{}** v{}\nUp for {}.",
        name,
        env!("CARGO_PKG_VERSION"),
        humantime::format_duration(uptime)
    )
}
