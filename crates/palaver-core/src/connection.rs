//! Connection lifecycle state machine.
//!
//! Owns the live channel's lifecycle: bootstrap identity over HTTP, open the
//! channel, authenticate, detect loss, and schedule retries. Pure state
//! machine in the action pattern - events in, actions out, no I/O.
//!
//! # State Machine
//!
//! ```text
//! ┌──────────────┐ Start ┌─────────────────┐ identity ok ┌────────────┐
//! │ Disconnected │──────>│ IdentityPending │────────────>│ Connecting │
//! └──────────────┘       └─────────────────┘             └────────────┘
//!        identity failed ──> Failed ──timer──┘   channel open │
//!                                                             ↓
//! ┌──────────────┐ timer  ┌──────────────┐ close   ┌────────────────┐
//! │  Connecting  │<───────│ Reconnecting │<────────│ Authenticating │
//! └──────────────┘        └──────────────┘  close  └────────────────┘
//!                                             ↑        auth ok │
//!                                             └────────────────┤
//!                                                 ┌───────────┐↓
//!                                                 │ Connected │
//!                                                 └───────────┘
//! ```
//!
//! `Failed` is terminal only for the attempt that produced it: every entry
//! into `Failed` or `Reconnecting` arms a timer, and the timer always leads
//! back into a fresh attempt. The machine never gives up while the client
//! process is alive.

use palaver_proto::{ClientFrame, User};

use crate::{env::Environment, error::ConnectionError, retry::RetryPolicy};

/// Username used when no identity is stored.
const ANONYMOUS: &str = "Anonymous";

/// Phase of the live-channel lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    /// Not started.
    Disconnected,
    /// Fetching identity over the request/response API.
    IdentityPending,
    /// Opening the live channel.
    Connecting,
    /// Channel open, `auth` sent, awaiting `auth_response`.
    Authenticating,
    /// Authenticated; commands flow over the live channel.
    Connected,
    /// Channel lost; a retry timer is armed.
    Reconnecting,
    /// The last attempt failed; a retry timer is armed.
    Failed,
}

/// Events fed into the connection state machine.
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// Begin the bootstrap sequence.
    Start,
    /// The identity fetch completed.
    IdentityFetched {
        /// Stored username, if the server knows one.
        username: Option<String>,
    },
    /// The identity fetch failed.
    IdentityFailed {
        /// Failure description.
        reason: String,
    },
    /// The live channel is open.
    ChannelOpen,
    /// The live channel closed or errored.
    ChannelClosed {
        /// Close or error description.
        reason: String,
    },
    /// The server accepted our `auth` frame.
    AuthSucceeded {
        /// The authenticated user.
        user: User,
    },
    /// The server rejected our `auth` frame.
    AuthFailed {
        /// Rejection reason.
        reason: String,
    },
    /// A previously armed retry timer elapsed.
    TimerElapsed,
}

/// Actions the connection state machine asks the driver to execute.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionAction {
    /// Fetch the client identity (`GET /api/identity`).
    FetchIdentity,
    /// Open the live channel.
    OpenChannel,
    /// Send this frame on the live channel.
    SendFrame(ClientFrame),
    /// Arm a one-shot timer; feed [`ConnectionEvent::TimerElapsed`] when it
    /// fires.
    StartTimer(std::time::Duration),
    /// The observable phase changed. Emitted exactly once per actual
    /// transition.
    PhaseChanged(ConnectionPhase),
}

/// What a retry timer resumes into once it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResumeTarget {
    /// Re-run the identity bootstrap.
    Identity,
    /// Re-open the live channel.
    Channel,
}

/// Connection lifecycle state machine.
///
/// One instance per client session. Generic over [`Environment`] for retry
/// jitter; holds no instants itself - timers are actions executed by the
/// driver.
#[derive(Debug, Clone)]
pub struct Connection<E: Environment> {
    env: E,
    phase: ConnectionPhase,
    /// Username to authenticate with; `None` until stored or fetched.
    username: Option<String>,
    /// Authenticated user, while `Connected`.
    user: Option<User>,
    /// Consecutive failures since the last successful authentication.
    retry_count: u32,
    /// Most recent failure description.
    last_error: Option<String>,
    /// Where the armed timer resumes, while `Failed` or `Reconnecting`.
    resume: ResumeTarget,
}

impl<E: Environment> Connection<E> {
    /// Create a new connection in [`ConnectionPhase::Disconnected`].
    ///
    /// `stored_username` seeds the `auth` frame before any identity fetch
    /// has completed; pass the persisted username if one exists.
    pub fn new(env: E, stored_username: Option<String>) -> Self {
        Self {
            env,
            phase: ConnectionPhase::Disconnected,
            username: stored_username,
            user: None,
            retry_count: 0,
            last_error: None,
            resume: ResumeTarget::Identity,
        }
    }

    /// Current phase.
    pub fn phase(&self) -> ConnectionPhase {
        self.phase
    }

    /// Whether commands may be sent on the live channel.
    pub fn is_connected(&self) -> bool {
        self.phase == ConnectionPhase::Connected
    }

    /// Consecutive failures since the last successful authentication.
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Most recent failure description. `None` if none occurred yet.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Username used for authentication.
    pub fn username(&self) -> &str {
        self.username.as_deref().unwrap_or(ANONYMOUS)
    }

    /// The authenticated user. `None` unless `Connected`.
    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    /// Process one event.
    ///
    /// # Errors
    ///
    /// [`ConnectionError::InvalidTransition`] only for caller misuse
    /// ([`ConnectionEvent::Start`] on an already started machine). Stale
    /// events are absorbed and return no actions.
    pub fn handle(
        &mut self,
        event: ConnectionEvent,
    ) -> Result<Vec<ConnectionAction>, ConnectionError> {
        use ConnectionEvent as Ev;
        use ConnectionPhase as Ph;

        let actions = match (self.phase, event) {
            (Ph::Disconnected, Ev::Start) => {
                self.enter(Ph::IdentityPending, vec![ConnectionAction::FetchIdentity])
            },
            (_, Ev::Start) => {
                return Err(ConnectionError::InvalidTransition {
                    phase: self.phase,
                    operation: "start",
                });
            },

            (Ph::IdentityPending, Ev::IdentityFetched { username }) => {
                if let Some(name) = username {
                    self.username = Some(name);
                }
                self.enter(Ph::Connecting, vec![ConnectionAction::OpenChannel])
            },
            (Ph::IdentityPending, Ev::IdentityFailed { reason }) => {
                self.fail(reason, ResumeTarget::Identity, RetryPolicy::IDENTITY)
            },

            (Ph::Connecting, Ev::ChannelOpen) => {
                let auth = ClientFrame::Auth { username: self.username().to_owned() };
                self.enter(Ph::Authenticating, vec![ConnectionAction::SendFrame(auth)])
            },

            (Ph::Authenticating, Ev::AuthSucceeded { user }) => {
                self.retry_count = 0;
                self.last_error = None;
                self.user = Some(user);
                // Directory state may not have survived the disconnect:
                // always re-request the full room list before trusting
                // deltas again.
                self.enter(
                    Ph::Connected,
                    vec![ConnectionAction::SendFrame(ClientFrame::GetRooms)],
                )
            },
            (Ph::Authenticating, Ev::AuthFailed { reason }) => {
                self.fail(reason, ResumeTarget::Channel, RetryPolicy::CHANNEL)
            },

            (
                Ph::Connecting | Ph::Authenticating | Ph::Connected,
                Ev::ChannelClosed { reason },
            ) => {
                self.user = None;
                self.retry_count = self.retry_count.saturating_add(1);
                self.last_error = Some(reason);
                self.resume = ResumeTarget::Channel;
                let delay = RetryPolicy::CHANNEL.delay(self.retry_count, &self.env);
                self.enter(Ph::Reconnecting, vec![ConnectionAction::StartTimer(delay)])
            },

            (Ph::Reconnecting, Ev::TimerElapsed) => {
                self.enter(Ph::Connecting, vec![ConnectionAction::OpenChannel])
            },
            (Ph::Failed, Ev::TimerElapsed) => match self.resume {
                ResumeTarget::Identity => {
                    self.enter(Ph::IdentityPending, vec![ConnectionAction::FetchIdentity])
                },
                ResumeTarget::Channel => {
                    self.enter(Ph::Connecting, vec![ConnectionAction::OpenChannel])
                },
            },

            // Everything else is a stale or racing input: a timer that fired
            // after the channel reopened, a duplicate close notification, an
            // auth reply that outlived its connection.
            _ => vec![],
        };

        Ok(actions)
    }

    /// Transition into `phase`, appending the observable notification.
    fn enter(
        &mut self,
        phase: ConnectionPhase,
        mut actions: Vec<ConnectionAction>,
    ) -> Vec<ConnectionAction> {
        self.phase = phase;
        actions.push(ConnectionAction::PhaseChanged(phase));
        actions
    }

    /// Record a failure and arm the retry timer.
    fn fail(
        &mut self,
        reason: String,
        resume: ResumeTarget,
        policy: RetryPolicy,
    ) -> Vec<ConnectionAction> {
        self.retry_count = self.retry_count.saturating_add(1);
        self.last_error = Some(reason);
        self.resume = resume;
        let delay = policy.delay(self.retry_count, &self.env);
        self.enter(ConnectionPhase::Failed, vec![ConnectionAction::StartTimer(delay)])
    }
}
