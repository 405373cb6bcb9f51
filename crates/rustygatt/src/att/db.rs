//! The attribute database: a flat, handle-indexed table built by
//! flattening a list of GATT services.
//!
//! Handles are assigned at build time, contiguously from 1 in insertion
//! order. Each service, characteristic declaration, characteristic value,
//! and descriptor occupies one handle. The database is frozen once built;
//! only handler-owned state mutates afterwards.

use super::constants::*;
use crate::gatt::handler::{NotifyHandler, ReadHandler, WriteHandler};
use crate::gatt::types::{CharInfo, Property, Service};
use crate::uuid::Uuid;
use std::sync::Arc;

/// One row of the attribute table.
pub struct Attribute {
    pub handle: u16,
    pub typ: Uuid,
    pub props: Property,
    pub secure: Property,
    /// Stored value, served verbatim when no read handler is attached.
    pub value: Vec<u8>,
    /// End handle of the owning service group.
    pub group_end: u16,
    /// Value handle of the owning characteristic (equals `handle` for a
    /// characteristic value attribute, 0 for service and declaration rows).
    pub owner_value_handle: u16,
    /// The owning characteristic, for handler request contexts.
    pub char_info: Option<CharInfo>,
    pub rhandler: Option<Arc<dyn ReadHandler>>,
    pub whandler: Option<Arc<dyn WriteHandler>>,
    pub nhandler: Option<Arc<dyn NotifyHandler>>,
    pub is_cccd: bool,
}

/// The frozen attribute table plus the service tree it was built from.
pub struct AttrDb {
    attrs: Vec<Attribute>,
    services: Vec<Service>,
}

impl AttrDb {
    /// Flattens `services` into an attribute table starting at handle 1.
    ///
    /// Handles are written back into the service tree, and every service
    /// and characteristic end handle is patched to the last handle emitted
    /// within it.
    pub fn new(mut services: Vec<Service>) -> Self {
        let mut attrs: Vec<Attribute> = Vec::new();
        let mut next: u16 = ATT_HANDLE_MIN;

        for svc in services.iter_mut() {
            assert!(next != 0, "attribute table exceeds 0xFFFF handles");
            svc.handle = next;
            let svc_row = attrs.len();
            attrs.push(Attribute {
                handle: next,
                typ: Uuid::from_u16(PRIMARY_SERVICE_UUID),
                props: Property::READ,
                secure: Property::default(),
                value: svc.uuid().wire_bytes(),
                group_end: 0,
                owner_value_handle: 0,
                char_info: None,
                rhandler: None,
                whandler: None,
                nhandler: None,
                is_cccd: false,
            });
            next = next.wrapping_add(1);

            for ch in svc.characteristics_mut() {
                ch.decl_handle = next;
                ch.value_handle = next.wrapping_add(1);

                let mut decl_value = vec![ch.props.0];
                decl_value.extend_from_slice(&ch.value_handle.to_le_bytes());
                decl_value.extend_from_slice(&ch.uuid().wire_bytes());
                attrs.push(Attribute {
                    handle: ch.decl_handle,
                    typ: Uuid::from_u16(CHARACTERISTIC_UUID),
                    props: Property::READ,
                    secure: Property::default(),
                    value: decl_value,
                    group_end: 0,
                    owner_value_handle: 0,
                    char_info: None,
                    rhandler: None,
                    whandler: None,
                    nhandler: None,
                    is_cccd: false,
                });
                attrs.push(Attribute {
                    handle: ch.value_handle,
                    typ: ch.uuid(),
                    props: ch.props,
                    secure: ch.secure,
                    value: ch.value.clone(),
                    group_end: 0,
                    owner_value_handle: ch.value_handle,
                    char_info: None,
                    rhandler: ch.rhandler.clone(),
                    whandler: ch.whandler.clone(),
                    nhandler: ch.nhandler.clone(),
                    is_cccd: false,
                });
                next = next.wrapping_add(2);

                let ch_value_handle = ch.value_handle;
                for desc in ch.descriptors_mut() {
                    desc.handle = next;
                    attrs.push(Attribute {
                        handle: next,
                        typ: desc.uuid(),
                        props: desc.props,
                        secure: desc.secure,
                        value: desc.value.clone(),
                        group_end: 0,
                        owner_value_handle: ch_value_handle,
                        char_info: None,
                        rhandler: desc.rhandler.clone(),
                        whandler: desc.whandler.clone(),
                        nhandler: None,
                        is_cccd: desc.is_cccd,
                    });
                    next = next.wrapping_add(1);
                }

                ch.end_handle = next.wrapping_sub(1);
            }

            svc.end_handle = next.wrapping_sub(1);
            for row in &mut attrs[svc_row..] {
                row.group_end = svc.end_handle;
            }
        }

        // Backfill characteristic contexts now that end handles are known.
        for svc in &services {
            for ch in svc.characteristics() {
                let info = ch.info();
                for h in ch.decl_handle..=ch.end_handle {
                    attrs[(h - 1) as usize].char_info = Some(info.clone());
                }
            }
        }

        AttrDb { attrs, services }
    }

    /// Like [`new`](AttrDb::new), but prepends the standard Generic Access
    /// (0x1800) and Generic Attribute (0x1801) services exposing the
    /// device name, an appearance of generic computer, and Service Changed.
    pub fn with_preamble(name: &str, services: Vec<Service>) -> Self {
        let mut all = Vec::with_capacity(services.len() + 2);

        let mut gap = Service::new(Uuid::from_u16(GAP_SERVICE_UUID));
        gap.add_characteristic(Uuid::from_u16(DEVICE_NAME_UUID))
            .set_value(name.as_bytes());
        gap.add_characteristic(Uuid::from_u16(APPEARANCE_UUID))
            .set_value(&[0x00, 0x80]);
        all.push(gap);

        let mut gatt = Service::new(Uuid::from_u16(GATT_SERVICE_UUID));
        gatt.add_characteristic(Uuid::from_u16(SERVICE_CHANGED_UUID));
        all.push(gatt);

        all.extend(services);
        AttrDb::new(all)
    }

    /// Number of attributes; handles run `1..=len`.
    pub fn len(&self) -> u16 {
        self.attrs.len() as u16
    }

    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }

    pub fn services(&self) -> &[Service] {
        &self.services
    }

    /// Looks up a single attribute by handle.
    pub fn by_handle(&self, handle: u16) -> Option<&Attribute> {
        if handle < ATT_HANDLE_MIN || handle as usize > self.attrs.len() {
            return None;
        }
        Some(&self.attrs[(handle - 1) as usize])
    }

    /// Iterates attributes with handles in `[start, end]`, in handle order.
    /// Bounds are clamped to the populated range.
    pub fn range(&self, start: u16, end: u16) -> impl Iterator<Item = &Attribute> {
        let n = self.attrs.len();
        let lo = (start.max(ATT_HANDLE_MIN) as usize - 1).min(n);
        let hi = (end as usize).min(n).max(lo);
        self.attrs[lo..hi].iter()
    }

    /// Iterates attributes in `[start, end]` whose type equals `typ`.
    pub fn by_type_in_range<'a>(
        &'a self,
        start: u16,
        end: u16,
        typ: &'a Uuid,
    ) -> impl Iterator<Item = &'a Attribute> {
        self.range(start, end).filter(move |a| a.typ == *typ)
    }
}
