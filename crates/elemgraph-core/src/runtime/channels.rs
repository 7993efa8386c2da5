// crates/elemgraph-core/src/runtime/channels.rs
// ============================================================================
// Module: Elemgraph Channel Operations
// Description: Direct-channel interning, membership discipline, messaging.
// Purpose: Enforce channel membership rules and message immutability entry.
// Dependencies: crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! Direct channels are interned: the canonical name is derived from the
//! unordered member pair, so looking up or creating the channel for a pair
//! is stable across argument order. Group channels carry a permission block
//! deciding who may modify the member set; direct channels refuse
//! membership changes outright. Messages may only be created by a current
//! member of the channel.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use serde::Deserialize;
use serde_json::Value;
use serde_json::json;

use crate::core::Attachment;
use crate::core::Channel;
use crate::core::ChannelKind;
use crate::core::Element;
use crate::core::ElementId;
use crate::core::ElementKind;
use crate::core::EngineError;
use crate::core::EventKind;
use crate::core::MemberPolicy;
use crate::core::Message;
use crate::core::NewChannel;
use crate::core::NewElement;
use crate::core::NewEvent;
use crate::core::NewMessage;
use crate::core::element::direct_channel_name;
use crate::core::identifiers::ActorId;
use crate::interfaces::PersistedElement;
use crate::interfaces::StorageBackend;
use crate::interfaces::WriteOp;
use crate::runtime::engine::ElementEngine;
use crate::runtime::engine::MutateOptions;

// ============================================================================
// SECTION: Inputs and Outcomes
// ============================================================================

/// Input for sending a direct message.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectMessageInput {
    /// The other member of the direct channel.
    pub recipient: ActorId,
    /// Inline body.
    #[serde(default)]
    pub content: Option<String>,
    /// Body stored by reference.
    #[serde(default)]
    pub content_ref: Option<ElementId>,
    /// Attachments.
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    /// Message tags.
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Message metadata.
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

/// Outcome of sending a direct message.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectMessageOutcome {
    /// The interned direct channel.
    pub channel: Channel,
    /// The created message.
    pub message: Message,
    /// Whether the channel was created by this call.
    pub channel_created: bool,
}

// ============================================================================
// SECTION: Channel Operations
// ============================================================================

impl<B: StorageBackend> ElementEngine<B> {
    /// Loads a live channel or fails with the appropriate kind.
    fn load_channel(&self, id: &ElementId) -> Result<Channel, EngineError> {
        let persisted = self.load_live(id)?;
        let actual = persisted.element.kind();
        match persisted.element {
            Element::Channel(channel) => Ok(channel),
            _ => Err(EngineError::TypeMismatch {
                id: id.clone(),
                expected: ElementKind::Channel,
                actual,
            }),
        }
    }

    /// Reports whether the actor may modify the channel's member set.
    fn can_modify_members(channel: &Channel, actor: &ActorId) -> bool {
        match channel.permissions.modify_members {
            MemberPolicy::Creator => &channel.core.created_by == actor,
            MemberPolicy::Members => {
                channel.members.contains(actor) || &channel.core.created_by == actor
            }
        }
    }

    /// Returns the direct channel for an unordered member pair, creating it
    /// when absent. Stable across argument swap.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidInput`] when the acting actor is not
    /// one of the pair.
    pub fn find_or_create_direct_channel(
        &self,
        a: &ActorId,
        b: &ActorId,
        actor: &ActorId,
    ) -> Result<(Channel, bool), EngineError> {
        Self::require_public_actor(actor)?;
        if a == b {
            return Err(EngineError::InvalidInput {
                message: "a direct channel requires two distinct members".to_string(),
            });
        }
        if actor != a && actor != b {
            return Err(EngineError::InvalidInput {
                message: format!("actor {actor} is not a member of the requested pair"),
            });
        }
        let name = direct_channel_name(a, b);
        if let Some(persisted) =
            self.backend().find_channel_by_name(ChannelKind::Direct, &name, None)?
            && let Element::Channel(channel) = persisted.element
        {
            return Ok((channel, false));
        }
        let input = NewChannel {
            channel_type: Some(ChannelKind::Direct),
            name: None,
            members: BTreeSet::from([a.clone(), b.clone()]),
            permissions: None,
            tags: BTreeSet::new(),
            metadata: BTreeMap::new(),
        };
        let element =
            self.create(NewElement::Channel(input), &MutateOptions::new(actor.clone()))?;
        match element {
            Element::Channel(channel) => Ok((channel, true)),
            _ => Err(EngineError::InvalidInput {
                message: "channel factory produced a non-channel element".to_string(),
            }),
        }
    }

    /// Adds a member to a group channel. Idempotent: adding a present
    /// member changes nothing and emits no event.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::DirectChannelMembership`] for direct channels
    /// and [`EngineError::CannotModifyMembers`] when the actor lacks
    /// permission.
    pub fn add_channel_member(
        &self,
        channel_id: &ElementId,
        member: &ActorId,
        actor: &ActorId,
    ) -> Result<Channel, EngineError> {
        Self::require_public_actor(actor)?;
        let channel = self.load_channel(channel_id)?;
        if channel.channel_type == ChannelKind::Direct {
            return Err(EngineError::DirectChannelMembership {
                channel: channel_id.clone(),
            });
        }
        if !Self::can_modify_members(&channel, actor) {
            return Err(EngineError::CannotModifyMembers {
                channel: channel_id.clone(),
                actor: actor.clone(),
            });
        }
        if channel.members.contains(member) {
            return Ok(channel);
        }
        self.apply_membership_change(channel, member, actor, EventKind::MemberAdded)
    }

    /// Removes a member from a group channel.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotAMember`] when the member is absent, plus
    /// the same constraint failures as member addition.
    pub fn remove_channel_member(
        &self,
        channel_id: &ElementId,
        member: &ActorId,
        actor: &ActorId,
    ) -> Result<Channel, EngineError> {
        Self::require_public_actor(actor)?;
        let channel = self.load_channel(channel_id)?;
        if channel.channel_type == ChannelKind::Direct {
            return Err(EngineError::DirectChannelMembership {
                channel: channel_id.clone(),
            });
        }
        if !Self::can_modify_members(&channel, actor) && actor != member {
            return Err(EngineError::CannotModifyMembers {
                channel: channel_id.clone(),
                actor: actor.clone(),
            });
        }
        if !channel.members.contains(member) {
            return Err(EngineError::NotAMember {
                channel: channel_id.clone(),
                actor: member.clone(),
            });
        }
        self.apply_membership_change(channel, member, actor, EventKind::MemberRemoved)
    }

    /// Removes the acting actor from a group channel; self-removal needs no
    /// member-modification permission.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotAMember`] when the actor is not a member.
    pub fn leave_channel(
        &self,
        channel_id: &ElementId,
        actor: &ActorId,
    ) -> Result<Channel, EngineError> {
        Self::require_public_actor(actor)?;
        let channel = self.load_channel(channel_id)?;
        if channel.channel_type == ChannelKind::Direct {
            return Err(EngineError::DirectChannelMembership {
                channel: channel_id.clone(),
            });
        }
        if !channel.members.contains(actor) {
            return Err(EngineError::NotAMember {
                channel: channel_id.clone(),
                actor: actor.clone(),
            });
        }
        self.apply_membership_change(channel, actor, actor, EventKind::MemberRemoved)
    }

    /// Persists a membership change with its base and auxiliary events.
    fn apply_membership_change(
        &self,
        mut channel: Channel,
        member: &ActorId,
        actor: &ActorId,
        membership_event: EventKind,
    ) -> Result<Channel, EngineError> {
        let id = channel.core.id.clone();
        let old_wire = Element::Channel(channel.clone()).to_wire()?;
        let now = self.now();
        if membership_event == EventKind::MemberAdded {
            channel.members.insert(member.clone());
        } else {
            channel.members.remove(member);
        }
        channel.core.updated_at = now;
        let element = Element::Channel(channel);
        let new_wire = element.to_wire()?;
        let base_event = NewEvent {
            element_id: id.clone(),
            event_type: EventKind::Updated,
            actor: actor.clone(),
            old_value: Some(old_wire),
            new_value: Some(new_wire),
            created_at: now,
        };
        let membership = NewEvent {
            element_id: id.clone(),
            event_type: membership_event,
            actor: actor.clone(),
            old_value: None,
            new_value: Some(json!({ "member": member })),
            created_at: now,
        };
        self.backend().apply(&[
            PersistedElement::put_op(element.clone())?,
            WriteOp::AppendEvent(base_event),
            WriteOp::AppendEvent(membership),
            WriteOp::MarkDirty(id),
        ])?;
        match element {
            Element::Channel(channel) => Ok(channel),
            _ => Err(EngineError::InvalidInput {
                message: "membership change lost the channel variant".to_string(),
            }),
        }
    }

    /// Interns the direct channel for the pair and sends a message there.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when interning or message creation fails.
    pub fn send_direct_message(
        &self,
        sender: &ActorId,
        input: DirectMessageInput,
    ) -> Result<DirectMessageOutcome, EngineError> {
        let (channel, channel_created) =
            self.find_or_create_direct_channel(sender, &input.recipient, sender)?;
        let message_input = NewMessage {
            channel_id: channel.core.id.clone(),
            sender: sender.clone(),
            content: input.content,
            content_ref: input.content_ref,
            attachments: input.attachments,
            tags: input.tags,
            metadata: input.metadata,
        };
        let element = self.create(
            NewElement::Message(message_input),
            &MutateOptions::new(sender.clone()),
        )?;
        match element {
            Element::Message(message) => Ok(DirectMessageOutcome {
                channel,
                message,
                channel_created,
            }),
            _ => Err(EngineError::InvalidInput {
                message: "message factory produced a non-message element".to_string(),
            }),
        }
    }
}
