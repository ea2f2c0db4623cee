//! XML storage: the append-only grade ledger and the directory of uploaded
//! grade documents it lives in.
//!
//! Record shape:
//!
//! ```xml
//! <StudentsGrades>
//!   <Grade>
//!     <StudentName/><Subject/><GradeValue/><Date/>[<Teacher/>][<Cafedra/>]
//!   </Grade>
//! </StudentsGrades>
//! ```

mod ledger;
pub mod tree;
mod uploads;

pub use ledger::XmlLedger;
pub use tree::XmlError;
pub use uploads::{UploadDirectory, XmlFileInfo};

/// File name of the ledger inside the XML directory.
pub const LEDGER_FILE_NAME: &str = "grades.xml";

const ROOT: &str = "StudentsGrades";
const GRADE: &str = "Grade";
const STUDENT_NAME: &str = "StudentName";
const SUBJECT: &str = "Subject";
const GRADE_VALUE: &str = "GradeValue";
const DATE: &str = "Date";
const TEACHER: &str = "Teacher";
const CAFEDRA: &str = "Cafedra";
