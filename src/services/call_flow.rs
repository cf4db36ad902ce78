use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::db::queries;
use crate::models::{CallSession, CallState, Company, EngineReply, TurnRole, TurnSignal};
use crate::services::ai::TurnContext;
use crate::services::ledger::LedgerError;
use crate::services::slots::{self, Slot};
use crate::state::AppState;

/// Consecutive adapter failures tolerated before the call is given up.
pub const MAX_ADAPTER_FAILURES: u32 = 2;
/// How many slot options are spoken per offer.
pub const OFFER_BATCH: usize = 3;

const RETRY_LINE: &str = "Sorry, I lost you for a second there. Could you say that again?";
const FAILED_LINE: &str =
    "I'm having technical trouble on my end, so I'll let you go for now. We'll reach out another time. Goodbye!";
const NO_AVAILABILITY_LINE: &str =
    "It looks like we don't have any open times right now. We'll reach out once the calendar opens up. Thanks for your time!";
const NO_MORE_TIMES_LINE: &str =
    "Those were all the times we had open. We'll follow up when more open up. Thanks for your time!";
const GOODBYE_LINE: &str = "Thanks for your time today. Goodbye!";
const LEDGER_DOWN_LINE: &str =
    "I wasn't able to save that booking just now. We'll call back to set it up properly. Sorry about that, and goodbye!";

/// One inbound webhook event, normalized by the handler layer.
#[derive(Debug)]
pub enum CallEvent {
    Started,
    Speech { text: String, seq: i64 },
    Ended,
}

/// Advance one call by one event. This is the only entry point into a
/// session's state; the registry hands out the session and this function
/// holds its lock for the whole turn.
pub async fn handle_event(
    state: &Arc<AppState>,
    call_id: &str,
    company_id: &str,
    event: CallEvent,
) -> anyhow::Result<EngineReply> {
    match event {
        CallEvent::Started => handle_started(state, call_id, company_id).await,
        CallEvent::Speech { text, seq } => {
            handle_speech(state, call_id, company_id, &text, seq).await
        }
        CallEvent::Ended => handle_ended(state, call_id).await,
    }
}

async fn handle_started(
    state: &Arc<AppState>,
    call_id: &str,
    company_id: &str,
) -> anyhow::Result<EngineReply> {
    let session = state.sessions.get_or_create(call_id, company_id);
    let mut session = session.lock().await;
    let now = Utc::now();

    // Providers retry the initial webhook; greet once.
    if !session.transcript.is_empty() {
        if let Some(reply) = &session.last_reply {
            return Ok(reply.clone());
        }
    }

    let company = load_company(state, company_id);
    let greeting = format!(
        "Hi there, this is {} calling from {}. May I borrow a minute to share how we help teams book more customer meetings?",
        company.agent_name, company.name
    );

    session.record(TurnRole::Agent, &greeting, now);
    session.last_activity = now;

    let reply = EngineReply {
        say: greeting,
        end_call: false,
    };
    session.last_reply = Some(reply.clone());
    Ok(reply)
}

async fn handle_ended(state: &Arc<AppState>, call_id: &str) -> anyhow::Result<EngineReply> {
    if let Some(session) = state.sessions.remove(call_id) {
        let mut session = session.lock().await;
        let now = Utc::now();
        if !session.state.is_terminal() {
            session.transition(CallState::Ended, now);
        }
        tracing::info!(call_id, state = session.state.as_str(), "call finished");
    }
    Ok(EngineReply {
        say: String::new(),
        end_call: true,
    })
}

async fn handle_speech(
    state: &Arc<AppState>,
    call_id: &str,
    company_id: &str,
    text: &str,
    seq: i64,
) -> anyhow::Result<EngineReply> {
    let session = state.sessions.get_or_create(call_id, company_id);
    let mut session = session.lock().await;
    let now = Utc::now();

    // Replayed delivery of an already-processed turn: answer exactly as
    // before, change nothing.
    if seq <= session.last_seq {
        if let Some(reply) = &session.last_reply {
            tracing::info!(call_id, seq, "replayed turn, returning cached reply");
            return Ok(reply.clone());
        }
    }

    if session.state.is_terminal() {
        return Ok(EngineReply {
            say: GOODBYE_LINE.to_string(),
            end_call: true,
        });
    }

    session.record(TurnRole::Prospect, text, now);
    let company = load_company(state, company_id);

    let reply = match next_turn_bounded(state, &session, &company).await {
        Some(turn) => {
            session.adapter_failures = 0;
            session
                .prospect
                .merge(turn.prospect_name.clone(), turn.prospect_contact.clone());
            tracing::info!(
                call_id,
                state = session.state.as_str(),
                signal = turn.signal.as_str(),
                "processing turn"
            );
            advance(state, call_id, &mut session, &company, turn.signal, &turn.utterance).await
        }
        None => {
            session.adapter_failures += 1;
            if session.adapter_failures >= MAX_ADAPTER_FAILURES {
                tracing::error!(call_id, "giving up after repeated adapter failures");
                session.transition(CallState::Failed, Utc::now());
                EngineReply {
                    say: FAILED_LINE.to_string(),
                    end_call: true,
                }
            } else {
                EngineReply {
                    say: RETRY_LINE.to_string(),
                    end_call: false,
                }
            }
        }
    };

    let now = Utc::now();
    if !reply.say.is_empty() {
        session.record(TurnRole::Agent, &reply.say, now);
    }
    session.last_seq = seq;
    session.last_reply = Some(reply.clone());
    session.last_activity = now;
    Ok(reply)
}

/// Ask the adapter for the next turn under a hard timeout. `None` covers
/// both timeout and error; the caller only cares that this turn produced
/// no usable signal.
async fn next_turn_bounded(
    state: &Arc<AppState>,
    session: &CallSession,
    company: &Company,
) -> Option<crate::models::TurnReply> {
    let tz = company.tz();
    let availability = {
        let db = state.db.lock().unwrap();
        queries::list_windows(&db, &session.company_id)
            .map(|w| crate::models::availability::summarize(&w))
            .unwrap_or_default()
    };
    let ctx = TurnContext {
        company: company.clone(),
        state: session.state,
        transcript: session.transcript.clone(),
        availability,
        offered: session
            .offered
            .iter()
            .map(|s| slots::format_slot(s, &tz))
            .collect(),
        prospect: session.prospect.clone(),
    };

    let deadline = Duration::from_secs(state.config.turn_timeout_secs);
    match tokio::time::timeout(deadline, state.turns.next_turn(&ctx)).await {
        Ok(Ok(turn)) => Some(turn),
        Ok(Err(e)) => {
            tracing::error!(error = %e, call_id = %session.call_id, "turn adapter failed");
            None
        }
        Err(_) => {
            tracing::error!(call_id = %session.call_id, "turn adapter timed out");
            None
        }
    }
}

/// The transition table: state x signal, with slot and ledger side effects.
async fn advance(
    state: &Arc<AppState>,
    call_id: &str,
    session: &mut CallSession,
    company: &Company,
    signal: TurnSignal,
    utterance: &str,
) -> EngineReply {
    let now = Utc::now();
    let tz = company.tz();

    match (session.state, signal) {
        (_, TurnSignal::EndCall) => {
            session.transition(CallState::Ended, now);
            EngineReply {
                say: or_scripted(utterance, GOODBYE_LINE),
                end_call: true,
            }
        }

        (CallState::Greeting, TurnSignal::Continue) => {
            session.transition(CallState::Pitching, now);
            speak(utterance)
        }

        (CallState::Pitching, TurnSignal::Continue) => {
            session.transition(CallState::AwaitingInterest, now);
            speak(utterance)
        }

        (
            CallState::Greeting | CallState::Pitching | CallState::AwaitingInterest,
            TurnSignal::WantsTimes,
        ) => {
            session.offer_cursor = 0;
            offer_times(state, session, company, &tz, "")
        }

        (
            CallState::Greeting | CallState::Pitching | CallState::AwaitingInterest,
            TurnSignal::Declines,
        ) => {
            session.transition(CallState::Declined, now);
            EngineReply {
                say: or_scripted(utterance, GOODBYE_LINE),
                end_call: true,
            }
        }

        (CallState::OfferingSlots, TurnSignal::SelectsOption(option)) => {
            match option.checked_sub(1).and_then(|i| session.offered.get(i)) {
                Some(slot) => {
                    let slot = *slot;
                    session.chosen = Some(slot);
                    session.transition(CallState::AwaitingConfirmation, now);
                    EngineReply {
                        say: format!(
                            "Just to confirm: {}, for {} minutes. Shall I book it?",
                            slots::format_slot(&slot, &tz),
                            slot.duration_minutes
                        ),
                        end_call: false,
                    }
                }
                // Out of range: re-prompt the same options, no transition.
                None => EngineReply {
                    say: format!(
                        "Sorry, I only have {} options on offer. {}",
                        session.offered.len(),
                        describe_options(&session.offered, &tz)
                    ),
                    end_call: false,
                },
            }
        }

        (CallState::OfferingSlots, TurnSignal::Declines) => {
            session.offer_cursor += session.offered.len();
            match compute_open_slots(state, &session.company_id) {
                Ok(open) if session.offer_cursor < open.len() => {
                    let say = stage_offer(session, &open, &tz);
                    EngineReply {
                        say: format!("No problem. {say}"),
                        end_call: false,
                    }
                }
                Ok(_) => {
                    session.transition(CallState::Declined, now);
                    EngineReply {
                        say: NO_MORE_TIMES_LINE.to_string(),
                        end_call: true,
                    }
                }
                Err(e) => fail_call(session, &e),
            }
        }

        (CallState::OfferingSlots, _) => EngineReply {
            say: describe_options(&session.offered, &tz),
            end_call: false,
        },

        (CallState::AwaitingConfirmation, TurnSignal::Confirms) => {
            let Some(slot) = session.chosen else {
                session.offer_cursor = 0;
                return offer_times(state, session, company, &tz, "");
            };

            match state
                .ledger
                .try_book(&session.company_id, &slot, &session.prospect, Some(call_id))
                .await
            {
                Ok(meeting) => {
                    tracing::info!(call_id, meeting_id = %meeting.id, "booking confirmed");
                    session.transition(CallState::Booked, now);
                    EngineReply {
                        say: format!(
                            "Wonderful, you're all set for {}. {}",
                            slots::format_slot(&slot, &tz),
                            GOODBYE_LINE
                        ),
                        end_call: true,
                    }
                }
                Err(LedgerError::SlotConflict) => {
                    tracing::warn!(call_id, "slot taken between offer and confirm, re-offering");
                    session.chosen = None;
                    session.offer_cursor = 0;
                    offer_times(
                        state,
                        session,
                        company,
                        &tz,
                        "I'm sorry, that time was just taken. ",
                    )
                }
                Err(LedgerError::Unavailable(e)) => {
                    session.transition(CallState::Failed, now);
                    tracing::error!(call_id, error = %e, "ledger unavailable during commit");
                    EngineReply {
                        say: LEDGER_DOWN_LINE.to_string(),
                        end_call: true,
                    }
                }
            }
        }

        (CallState::AwaitingConfirmation, TurnSignal::Declines) => {
            session.chosen = None;
            session.offer_cursor = 0;
            offer_times(state, session, company, &tz, "No problem. ")
        }

        (CallState::AwaitingConfirmation, _) => {
            let prompt = match session.chosen {
                Some(slot) => format!(
                    "Shall I book {} for you?",
                    slots::format_slot(&slot, &tz)
                ),
                None => "Shall I book that time for you?".to_string(),
            };
            speak(&or_scripted(utterance, &prompt))
        }

        // Plain conversation in any remaining state: speak and stay put.
        (_, _) => speak(utterance),
    }
}

/// Compute the open slot list and stage the next batch as the live offer,
/// moving the session into `OfferingSlots`. Empty calendars end the call
/// politely; a broken store fails it.
fn offer_times(
    state: &Arc<AppState>,
    session: &mut CallSession,
    company: &Company,
    tz: &chrono_tz::Tz,
    prefix: &str,
) -> EngineReply {
    let now = Utc::now();
    match compute_open_slots(state, &session.company_id) {
        Ok(open) if open.is_empty() => {
            session.transition(CallState::Ended, now);
            EngineReply {
                say: NO_AVAILABILITY_LINE.to_string(),
                end_call: true,
            }
        }
        Ok(open) => {
            let say = stage_offer(session, &open, tz);
            session.transition(CallState::OfferingSlots, now);
            EngineReply {
                say: format!("{prefix}{say}"),
                end_call: false,
            }
        }
        Err(e) => fail_call(session, &e),
    }
}

fn compute_open_slots(state: &Arc<AppState>, company_id: &str) -> anyhow::Result<Vec<Slot>> {
    let windows = {
        let db = state.db.lock().unwrap();
        queries::list_windows(&db, company_id)?
    };
    let booked = state.ledger.booked(company_id)?;
    Ok(slots::compute_slots(
        &windows,
        &booked,
        state.config.meeting_duration_minutes,
        state.config.horizon_days,
        Utc::now(),
    ))
}

/// Take the next OFFER_BATCH slots from `open` starting at the session's
/// cursor and make them the live offer.
fn stage_offer(session: &mut CallSession, open: &[Slot], tz: &chrono_tz::Tz) -> String {
    session.offered = open
        .iter()
        .skip(session.offer_cursor)
        .take(OFFER_BATCH)
        .copied()
        .collect();
    describe_options(&session.offered, tz)
}

fn describe_options(offered: &[Slot], tz: &chrono_tz::Tz) -> String {
    let options = offered
        .iter()
        .enumerate()
        .map(|(i, s)| format!("option {}, {}", i + 1, slots::format_slot(s, tz)))
        .collect::<Vec<_>>()
        .join("; ");
    format!("I can offer {options}. Which option works best for you?")
}

fn fail_call(session: &mut CallSession, error: &anyhow::Error) -> EngineReply {
    tracing::error!(call_id = %session.call_id, error = %error, "slot lookup failed");
    session.transition(CallState::Failed, Utc::now());
    EngineReply {
        say: LEDGER_DOWN_LINE.to_string(),
        end_call: true,
    }
}

fn load_company(state: &Arc<AppState>, company_id: &str) -> Company {
    let db = state.db.lock().unwrap();
    queries::get_company(&db, company_id)
        .ok()
        .flatten()
        .unwrap_or_else(|| Company::fallback(company_id))
}

fn speak(utterance: &str) -> EngineReply {
    EngineReply {
        say: or_scripted(utterance, "I'm still here. Where were we?"),
        end_call: false,
    }
}

fn or_scripted(utterance: &str, fallback: &str) -> String {
    if utterance.trim().is_empty() {
        fallback.to_string()
    } else {
        utterance.trim().to_string()
    }
}
