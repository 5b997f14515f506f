use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Suits in wire-protocol index order (`s`, `h`, `d`, `c`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Suit {
    Spades,
    Hearts,
    Diamonds,
    Clubs,
}

impl Suit {
    pub const ALL: [Suit; 4] = [Suit::Spades, Suit::Hearts, Suit::Diamonds, Suit::Clubs];

    pub fn index(self) -> u8 {
        self as u8
    }

    pub fn letter(self) -> char {
        match self {
            Suit::Spades => 's',
            Suit::Hearts => 'h',
            Suit::Diamonds => 'd',
            Suit::Clubs => 'c',
        }
    }

    fn from_letter(c: char) -> Option<Self> {
        match c {
            's' => Some(Suit::Spades),
            'h' => Some(Suit::Hearts),
            'd' => Some(Suit::Diamonds),
            'c' => Some(Suit::Clubs),
            _ => None,
        }
    }
}

impl Display for Suit {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.letter())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
#[repr(u8)]
pub enum Rank {
    Two = 2,
    Three,
    Four,
    Five,
    Six,
    Seven,
    Eight,
    Nine,
    Ten,
    Jack,
    Queen,
    King,
    Ace,
}

impl Rank {
    pub const ALL: [Rank; 13] = [
        Rank::Two,
        Rank::Three,
        Rank::Four,
        Rank::Five,
        Rank::Six,
        Rank::Seven,
        Rank::Eight,
        Rank::Nine,
        Rank::Ten,
        Rank::Jack,
        Rank::Queen,
        Rank::King,
        Rank::Ace,
    ];

    /// Face value, 2 through 14.
    pub fn value(self) -> u8 {
        self as u8
    }

    /// Position in `ALL`, 0 through 12.
    pub fn index(self) -> u8 {
        self.value() - 2
    }

    pub fn letter(self) -> char {
        match self {
            Rank::Two => '2',
            Rank::Three => '3',
            Rank::Four => '4',
            Rank::Five => '5',
            Rank::Six => '6',
            Rank::Seven => '7',
            Rank::Eight => '8',
            Rank::Nine => '9',
            Rank::Ten => 'T',
            Rank::Jack => 'J',
            Rank::Queen => 'Q',
            Rank::King => 'K',
            Rank::Ace => 'A',
        }
    }

    fn from_letter(c: char) -> Option<Self> {
        Rank::ALL.into_iter().find(|rank| rank.letter() == c)
    }
}

impl Display for Rank {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.letter())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid card token '{0}'")]
pub struct InvalidCard(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Card {
    pub rank: Rank,
    pub suit: Suit,
}

impl Card {
    pub const COUNT: usize = 52;

    pub fn new(rank: Rank, suit: Suit) -> Self {
        Self { rank, suit }
    }

    pub fn rank_value(&self) -> u8 {
        self.rank.value()
    }

    /// Canonical index: `rank_index * 4 + suit_index`.
    pub fn index(&self) -> usize {
        self.rank.index() as usize * 4 + self.suit.index() as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        if index >= Self::COUNT {
            return None;
        }
        let rank = Rank::ALL[index / 4];
        let suit = Suit::ALL[index % 4];
        Some(Self::new(rank, suit))
    }

    /// Parses an exact two-character protocol token such as `As` or `Td`.
    pub fn parse_token(token: &str) -> Option<Self> {
        let mut chars = token.chars();
        let (Some(r), Some(s), None) = (chars.next(), chars.next(), chars.next()) else {
            return None;
        };
        Some(Self::new(Rank::from_letter(r)?, Suit::from_letter(s)?))
    }
}

impl Display for Card {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.rank, self.suit)
    }
}

impl FromStr for Card {
    type Err = InvalidCard;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Card::parse_token(s).ok_or_else(|| InvalidCard(s.to_string()))
    }
}

/// Maps a protocol card token to its 0..52 index, `None` for anything else.
pub fn card_to_index(token: &str) -> Option<usize> {
    Card::parse_token(token).map(|card| card.index())
}

pub fn index_to_card(index: usize) -> Option<String> {
    Card::from_index(index).map(|card| card.to_string())
}

/// Parses every valid token, silently dropping the rest.
pub fn parse_cards<S: AsRef<str>>(tokens: &[S]) -> Vec<Card> {
    tokens
        .iter()
        .filter_map(|token| Card::parse_token(token.as_ref()))
        .collect()
}

pub fn standard_deck() -> Vec<Card> {
    (0..Card::COUNT).filter_map(Card::from_index).collect()
}
