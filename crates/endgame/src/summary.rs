use pgn_reader::{BufferedReader, RawHeader, SanPlus, Skip, Visitor};
use shakmaty::fen::Fen;
use shakmaty::{CastlingMode, Chess, Color, Outcome, Position};
use tracing::debug;

use crate::classify::{EndgameClass, Material, classify, endgame_tag};
use crate::error::AnalysisError;

/// How the final position ended the game, when the board alone decides it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardOutcome {
    Checkmate,
    Stalemate,
    InsufficientMaterial,
}

impl BoardOutcome {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Checkmate => "checkmate",
            Self::Stalemate => "stalemate",
            Self::InsufficientMaterial => "insufficient_material",
        }
    }

    fn of(position: &Chess) -> Option<Self> {
        if position.is_checkmate() {
            Some(Self::Checkmate)
        } else if position.is_stalemate() {
            Some(Self::Stalemate)
        } else if position.is_insufficient_material() {
            Some(Self::InsufficientMaterial)
        } else {
            None
        }
    }
}

/// Per-game summary written by the analysis runner.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GameSummary {
    pub rook_endgame: bool,
    pub played_out: u32,
    pub winner: Option<Color>,
    pub outcome: Option<BoardOutcome>,
    /// `Result` tag as written in the PGN.
    pub result: Option<String>,
    /// Last word of the `Termination` tag, e.g. `resignation`.
    pub termination: Option<String>,
    pub white_elo: Option<u32>,
    pub black_elo: Option<u32>,
    pub t_5men: Option<String>,
    pub t_4men: Option<String>,
    pub t_3men: Option<String>,
    /// Moves played with fewer than six pieces on the board.
    pub endgame_sequence: String,
    pub end_piece_count: u32,
}

impl GameSummary {
    /// `w`, `b` or `None` for draws and unfinished games.
    pub fn winner_tag(&self) -> Option<String> {
        self.winner.map(|color| color.char().to_string())
    }
}

#[derive(Debug, Default)]
pub struct SummaryVisitor {
    position: Chess,
    history: Vec<Material>,
    ply: u32,
    white_elo: Option<u32>,
    black_elo: Option<u32>,
    result: Option<String>,
    termination: Option<String>,
    fen: Option<String>,
    tagged_outcome: Option<Outcome>,
    t_5men: Option<String>,
    t_4men: Option<String>,
    t_3men: Option<String>,
    endgame_sequence: String,
    error: Option<AnalysisError>,
}

impl SummaryVisitor {
    pub fn new() -> Self {
        Self::default()
    }

    fn record_position(&mut self) {
        let board = self.position.board();
        let material = Material::of(board);
        let slot = match material.pieces {
            5 => Some(&mut self.t_5men),
            4 => Some(&mut self.t_4men),
            3 => Some(&mut self.t_3men),
            _ => None,
        };
        if let Some(slot) = slot
            && slot.is_none()
        {
            *slot = Some(endgame_tag(board));
        }
        self.history.push(material);
    }

    fn winner(&self) -> Option<Color> {
        if let Some(Outcome::Decisive { winner }) = self.position.outcome() {
            return Some(winner);
        }
        // Resignation or flag fall leaves the board undecided.
        match self.tagged_outcome {
            Some(Outcome::Decisive { winner }) => Some(winner),
            Some(Outcome::Draw) => None,
            None => match self.result.as_deref() {
                Some("1-0") => Some(Color::White),
                Some("0-1") => Some(Color::Black),
                _ => None,
            },
        }
    }
}

impl Visitor for SummaryVisitor {
    type Result = Result<GameSummary, AnalysisError>;

    fn begin_game(&mut self) {
        *self = Self::default();
    }

    fn header(&mut self, key: &[u8], value: RawHeader<'_>) {
        let value = String::from_utf8_lossy(&value.decode()).trim().to_string();
        match key {
            b"WhiteElo" => self.white_elo = value.parse().ok(),
            b"BlackElo" => self.black_elo = value.parse().ok(),
            b"Result" => self.result = Some(value),
            b"Termination" => {
                self.termination = value.split_whitespace().last().map(str::to_string)
            }
            b"FEN" => self.fen = Some(value),
            _ => {}
        }
    }

    fn end_headers(&mut self) -> Skip {
        if let Some(fen) = self.fen.take() {
            let position = Fen::from_ascii(fen.as_bytes())
                .map_err(|e| e.to_string())
                .and_then(|setup| {
                    setup
                        .into_position::<Chess>(CastlingMode::Standard)
                        .map_err(|e| e.to_string())
                });
            match position {
                Ok(position) => self.position = position,
                Err(reason) => {
                    self.error = Some(AnalysisError::InvalidFen { fen, reason });
                    return Skip(true);
                }
            }
        }
        self.record_position();
        Skip(false)
    }

    fn san(&mut self, san_plus: SanPlus) {
        if self.error.is_some() {
            return;
        }
        self.ply += 1;

        let mv = match san_plus.san.to_move(&self.position) {
            Ok(mv) => mv,
            Err(e) => {
                debug!(ply = self.ply, san = %san_plus, error = %e, "illegal move");
                self.error = Some(AnalysisError::IllegalMove {
                    ply: self.ply,
                    san: san_plus.to_string(),
                });
                return;
            }
        };

        let pieces_before = self.position.board().occupied().count();
        if pieces_before < 6 {
            let fullmoves = self.position.fullmoves();
            match self.position.turn() {
                Color::White => {
                    self.endgame_sequence
                        .push_str(&format!("{fullmoves}. {san_plus} "));
                }
                Color::Black if self.endgame_sequence.is_empty() => {
                    self.endgame_sequence
                        .push_str(&format!("{fullmoves}... {san_plus} "));
                }
                Color::Black => {
                    self.endgame_sequence.push_str(&format!("{san_plus} "));
                }
            }
        }

        self.position.play_unchecked(&mv);
        self.record_position();
    }

    fn begin_variation(&mut self) -> Skip {
        Skip(true)
    }

    fn outcome(&mut self, outcome: Option<Outcome>) {
        self.tagged_outcome = outcome;
    }

    fn end_game(&mut self) -> Self::Result {
        if let Some(error) = self.error.take() {
            return Err(error);
        }

        let EndgameClass {
            rook_endgame,
            played_out,
        } = classify(&self.history);

        Ok(GameSummary {
            rook_endgame,
            played_out,
            winner: self.winner(),
            outcome: BoardOutcome::of(&self.position),
            result: self.result.take(),
            termination: self.termination.take(),
            white_elo: self.white_elo,
            black_elo: self.black_elo,
            t_5men: self.t_5men.take(),
            t_4men: self.t_4men.take(),
            t_3men: self.t_3men.take(),
            endgame_sequence: self.endgame_sequence.trim_end().to_string(),
            end_piece_count: self.position.board().occupied().count() as u32,
        })
    }
}

/// Summarize the first game of a PGN transcript.
pub fn summarize(pgn: &str) -> Result<GameSummary, AnalysisError> {
    let mut reader = BufferedReader::new(pgn.as_bytes());
    let mut visitor = SummaryVisitor::new();
    match reader.read_game(&mut visitor)? {
        Some(summary) => summary,
        None => Err(AnalysisError::NoGame),
    }
}
