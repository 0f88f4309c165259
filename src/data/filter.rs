use bson::{doc, Document};
use uuid::Uuid;

#[inline]
pub fn by_id(id: Uuid) -> Document {
    doc! { "_id": id.to_string() }
}

#[inline]
pub fn by_email(email: impl AsRef<str>) -> Document {
    doc! { "email": email.as_ref() }
}

#[inline]
pub fn by_user(user_id: Uuid) -> Document {
    doc! { "userId": user_id.to_string() }
}

#[inline]
pub fn enrollment_of(student_id: Uuid, class_id: Uuid) -> Document {
    doc! {
        "studentId": student_id.to_string(),
        "classId": class_id.to_string(),
    }
}

/// `$lookup` + `$unwind` joining `local_field` against `_id` of `from`.
///
/// Unmatched documents are dropped, like an inner join.
pub fn join_one(from: &str, local_field: &str, alias: &str) -> [Document; 2] {
    [
        doc! {
            "$lookup": {
                "from": from,
                "localField": local_field,
                "foreignField": "_id",
                "as": alias,
            }
        },
        doc! { "$unwind": format!("${}", alias) },
    ]
}
