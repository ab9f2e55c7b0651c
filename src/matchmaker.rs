use crate::state::PlayerSlot;

/// What a `ready` produced: a seat in a half-filled room, or a completed
/// pairing that should start a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyOutcome {
    Waiting {
        room_id: u32,
        slot: PlayerSlot,
    },
    Paired {
        room_id: u32,
        slot: PlayerSlot,
        partner: u32,
    },
}

/// Pairs ready players in arrival order, one pending seat at a time.
///
/// The first player of a pair takes `Bottom`, the second `Top`, and room ids
/// count up from zero. Unlike a bare ready counter this survives the waiting
/// player leaving: withdrawing the seat lets the next two arrivals pair with
/// each other instead of splitting across a ghost room.
#[derive(Debug, Default)]
pub struct Matchmaker {
    waiting: Option<u32>,
    next_room_id: u32,
}

impl Matchmaker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_ready(&mut self, client_id: u32) -> ReadyOutcome {
        match self.waiting {
            // A repeated ready from the parked player re-announces the same
            // seat rather than pairing the player with themselves.
            Some(waiting) if waiting == client_id => ReadyOutcome::Waiting {
                room_id: self.next_room_id,
                slot: PlayerSlot::Bottom,
            },
            Some(partner) => {
                self.waiting = None;
                let room_id = self.next_room_id;
                self.next_room_id += 1;
                ReadyOutcome::Paired {
                    room_id,
                    slot: PlayerSlot::Top,
                    partner,
                }
            }
            None => {
                self.waiting = Some(client_id);
                ReadyOutcome::Waiting {
                    room_id: self.next_room_id,
                    slot: PlayerSlot::Bottom,
                }
            }
        }
    }

    /// Frees the pending seat if `client_id` holds it. Returns whether
    /// anything changed.
    pub fn withdraw(&mut self, client_id: u32) -> bool {
        if self.waiting == Some(client_id) {
            self.waiting = None;
            true
        } else {
            false
        }
    }
}
