//! DIMACS CNF output

use std::io::{self, Write};

use crate::cnf::Cnf;

/// Write a formula in DIMACS format
///
/// The variable count in the header is the maximum variable index appearing
/// in the clauses. The label-to-variable map is not part of the format; it
/// stays inside the instance.
pub fn write_dimacs<W: Write>(w: &mut W, cnf: &Cnf) -> io::Result<()> {
    let nb_vars = cnf
        .clauses()
        .iter()
        .flatten()
        .map(|lit| lit.abs())
        .max()
        .unwrap_or(0);
    writeln!(w, "p cnf {} {}", nb_vars, cnf.nb_clauses())?;
    for clause in cnf.clauses() {
        for lit in clause {
            write!(w, "{lit} ")?;
        }
        writeln!(w, "0")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format() {
        let mut cnf = Cnf::new();
        cnf.add_clause(vec![1, -3]);
        cnf.add_clause(vec![2]);
        let mut buf = Vec::new();
        write_dimacs(&mut buf, &cnf).unwrap();
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "p cnf 3 2\n1 -3 0\n2 0\n"
        );
    }

    #[test]
    fn test_empty() {
        let mut buf = Vec::new();
        write_dimacs(&mut buf, &Cnf::new()).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "p cnf 0 0\n");
    }
}
